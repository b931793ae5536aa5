//! EIP-712 typed-data construction for ERC-3009 transfer authorizations.
//!
//! A payment is authorized by signing a `TransferWithAuthorization`
//! struct under the token contract's EIP-712 domain. The domain binds the
//! signature to one chain and one contract; the message binds it to one
//! transfer and one nonce. Both halves are fixed by the ERC-3009 wire
//! contract: field names, types, and ordering must be reproduced exactly
//! or the settlement layer will reject the signature.

use alloy_primitives::{B256, FixedBytes, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};

use crate::networks::NetworkConfig;
use crate::types::ExactEvmPayloadAuthorization;

sol! {
    /// ERC-3009 `transferWithAuthorization` message, as typed in EIP-712
    /// signatures: authorizes moving `value` tokens from `from` to `to`,
    /// valid only between `validAfter` and `validBefore`, identified by a
    /// unique `nonce`.
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Builds the EIP-712 domain separator for a network's token deployment.
pub fn domain(config: &NetworkConfig) -> Eip712Domain {
    eip712_domain! {
        name: config.asset_name,
        version: config.asset_version,
        chain_id: config.chain_id,
        verifying_contract: config.asset_address,
    }
}

/// Computes the EIP-712 signing hash for an authorization on the given
/// network. Pure transform; the signer capability signs this hash.
pub fn signing_hash(config: &NetworkConfig, authorization: &ExactEvmPayloadAuthorization) -> B256 {
    let transfer = TransferWithAuthorization {
        from: authorization.from.into(),
        to: authorization.to.into(),
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: FixedBytes(authorization.nonce.0),
    };
    transfer.eip712_signing_hash(&domain(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks;
    use crate::timestamp::UnixTimestamp;
    use crate::types::{HexEncodedNonce, TokenAmount};
    use alloy_primitives::address;

    fn authorization(nonce: [u8; 32]) -> ExactEvmPayloadAuthorization {
        ExactEvmPayloadAuthorization {
            from: address!("0x1111111111111111111111111111111111111111").into(),
            to: address!("0x2222222222222222222222222222222222222222").into(),
            value: TokenAmount::from(10_000u64),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_000_300),
            nonce: HexEncodedNonce(nonce),
        }
    }

    #[test]
    fn domain_carries_network_parameters() {
        let config = networks::resolve("eip155:8453").unwrap();
        let domain = domain(config);
        assert_eq!(domain.name.as_deref(), Some("USD Coin"));
        assert_eq!(domain.version.as_deref(), Some("2"));
        assert_eq!(domain.chain_id, Some(U256::from(8453u64)));
        assert_eq!(domain.verifying_contract, Some(config.asset_address));
    }

    #[test]
    fn hash_is_deterministic() {
        let config = networks::resolve("eip155:8453").unwrap();
        let auth = authorization([7; 32]);
        assert_eq!(signing_hash(config, &auth), signing_hash(config, &auth));
    }

    #[test]
    fn hash_is_domain_separated_across_networks() {
        let base = networks::resolve("eip155:8453").unwrap();
        let sepolia = networks::resolve("eip155:84532").unwrap();
        let auth = authorization([7; 32]);
        assert_ne!(signing_hash(base, &auth), signing_hash(sepolia, &auth));
    }

    #[test]
    fn hash_changes_with_the_nonce() {
        let config = networks::resolve("eip155:8453").unwrap();
        assert_ne!(
            signing_hash(config, &authorization([1; 32])),
            signing_hash(config, &authorization([2; 32])),
        );
    }
}
