//! Registry of known USDC deployments, keyed by CAIP-2 chain identifier.
//!
//! Canonical identifiers follow the CAIP-2 `namespace:reference`
//! convention (e.g. `eip155:8453` for Base). Older deployments of the
//! protocol used bare network names; those survive as legacy aliases that
//! resolve onto the same canonical entry. Aliases are an indirection, not
//! duplicated entries, so an alias can never drift out of sync with the
//! config it names.
//!
//! Lookups are pure: the table is static and the maps are built once on
//! first access.

use alloy_primitives::{Address, address};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Chain parameters for one USDC deployment.
///
/// `asset_name` and `asset_version` feed the EIP-712 domain separator and
/// must match what the token contract reports, or signatures will not
/// verify on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Canonical CAIP-2 identifier (e.g. `eip155:8453`).
    pub id: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// USDC contract address on this chain.
    pub asset_address: Address,
    /// EIP-712 domain `name` of the token contract.
    pub asset_name: &'static str,
    /// EIP-712 domain `version` of the token contract.
    pub asset_version: &'static str,
}

/// All known USDC deployments, canonical identifiers only.
pub static KNOWN_NETWORKS: &[NetworkConfig] = &[
    // Base
    NetworkConfig {
        id: "eip155:8453",
        chain_id: 8453,
        asset_address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        asset_name: "USD Coin",
        asset_version: "2",
    },
    // Base Sepolia
    NetworkConfig {
        id: "eip155:84532",
        chain_id: 84532,
        asset_address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        asset_name: "USD Coin",
        asset_version: "2",
    },
    // Ethereum
    NetworkConfig {
        id: "eip155:1",
        chain_id: 1,
        asset_address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        asset_name: "USD Coin",
        asset_version: "2",
    },
    // Ethereum Sepolia
    NetworkConfig {
        id: "eip155:11155111",
        chain_id: 11155111,
        asset_address: address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
        asset_name: "USD Coin",
        asset_version: "2",
    },
    // Arc Testnet
    NetworkConfig {
        id: "eip155:5042002",
        chain_id: 5042002,
        asset_address: address!("0x3600000000000000000000000000000000000000"),
        asset_name: "USD Coin",
        asset_version: "2",
    },
];

/// Legacy bare-name aliases, each pointing at a canonical identifier.
pub static LEGACY_ALIASES: &[(&str, &str)] = &[
    ("base-mainnet", "eip155:8453"),
    ("base-sepolia", "eip155:84532"),
    ("ethereum-mainnet", "eip155:1"),
    ("ethereum-sepolia", "eip155:11155111"),
    ("arc-testnet", "eip155:5042002"),
];

static BY_ID: LazyLock<HashMap<&'static str, &'static NetworkConfig>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, &'static NetworkConfig> =
        KNOWN_NETWORKS.iter().map(|n| (n.id, n)).collect();
    for (alias, canonical) in LEGACY_ALIASES {
        let config = map
            .get(canonical)
            .copied()
            .expect("alias must point at a canonical entry");
        map.insert(alias, config);
    }
    map
});

/// Raised when a network identifier is not in the registry.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown network: {requested}; supported: {supported}")]
pub struct UnknownNetwork {
    /// The identifier that failed to resolve.
    pub requested: String,
    /// Comma-separated list of accepted identifiers.
    pub supported: String,
}

impl UnknownNetwork {
    fn new(requested: &str) -> Self {
        let supported = KNOWN_NETWORKS
            .iter()
            .map(|n| n.id)
            .chain(LEGACY_ALIASES.iter().map(|(alias, _)| *alias))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            requested: requested.to_string(),
            supported,
        }
    }
}

/// Resolves a network identifier (canonical or legacy alias) to its
/// chain parameters. Identifiers are case-sensitive.
pub fn resolve(identifier: &str) -> Result<&'static NetworkConfig, UnknownNetwork> {
    BY_ID
        .get(identifier)
        .copied()
        .ok_or_else(|| UnknownNetwork::new(identifier))
}

/// Whether the identifier resolves, canonical or alias.
pub fn is_known(identifier: &str) -> bool {
    BY_ID.contains_key(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_identifiers() {
        let base = resolve("eip155:8453").unwrap();
        assert_eq!(base.chain_id, 8453);
        assert_eq!(
            base.asset_address,
            address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")
        );
        assert_eq!(base.asset_name, "USD Coin");
        assert_eq!(base.asset_version, "2");

        let sepolia = resolve("eip155:84532").unwrap();
        assert_eq!(sepolia.chain_id, 84532);
    }

    #[test]
    fn aliases_resolve_to_the_same_config() {
        for (alias, canonical) in LEGACY_ALIASES {
            let via_alias = resolve(alias).unwrap();
            let via_canonical = resolve(canonical).unwrap();
            assert!(
                std::ptr::eq(via_alias, via_canonical),
                "{alias} does not share {canonical}'s entry"
            );
        }
    }

    #[test]
    fn unknown_identifier_is_rejected_with_diagnostics() {
        let err = resolve("polygon").unwrap_err();
        assert_eq!(err.requested, "polygon");
        assert!(err.supported.contains("eip155:8453"));
        assert!(err.supported.contains("base-mainnet"));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(is_known("base-mainnet"));
        assert!(!is_known("Base-Mainnet"));
        assert!(!is_known("EIP155:8453"));
    }
}
