//! Wire types for the x402 payment protocol.
//!
//! Field names, casing, and string-vs-integer typing here are part of the
//! wire contract shared with the x402 SDKs (TypeScript/Go): amounts and
//! timestamps travel as decimal strings, nonces and signatures as
//! 0x-prefixed hex. Server-side verification fails on any deviation, so
//! the serde implementations in this module are pinned by tests.
//!
//! Inbound, a 402 response carries [`PaymentRequired`] (base64 JSON in the
//! `X-PAYMENT-REQUIRED` header). Outbound, the retry carries a
//! [`PaymentPayload`] wrapping the signed [`ExactEvmPayload`]. A paid
//! response may carry [`SettlementInfo`] back.

use alloy_primitives::{Address, U256};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

/// Version marker for x402 protocol version 1; serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Payment scheme. Only `exact` is supported: the transferred amount must
/// match the authorization exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Exact => write!(f, "exact"),
        }
    }
}

/// An EVM address, wrapping [`alloy_primitives::Address`] for typed
/// handling and serde support.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct EvmAddress(pub Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to decode EVM address")]
pub struct EvmAddressDecodingError;

impl FromStr for EvmAddress {
    type Err = EvmAddressDecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address::from_str(s).map_err(|_| EvmAddressDecodingError)?;
        Ok(Self(address))
    }
}

impl From<EvmAddress> for Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        EvmAddress(address)
    }
}

/// An on-chain token amount in base units (USDC has 6 decimals).
///
/// Serialized as a decimal string to prevent precision loss in JSON.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        TokenAmount(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = U256::from_str_radix(&s, 10)
            .map_err(|_| serde::de::Error::custom("token amount must be a decimal string"))?;
        Ok(TokenAmount(value))
    }
}

/// A 65-byte EVM signature over EIP-712 typed data, hex-encoded on the
/// wire as `0x` plus 130 hex characters.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl From<[u8; 65]> for EvmSignature {
    fn from(bytes: [u8; 65]) -> Self {
        EvmSignature(bytes)
    }
}

impl Debug for EvmSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmSignature(0x{})", hex::encode(self.0))
    }
}

static SIG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("valid signature regex"));

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !SIG_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom(
                "invalid EVM signature: must be 0x-prefixed and 130 hex chars",
            ));
        }
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| serde::de::Error::custom("invalid hex in EVM signature"))?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be exactly 65 bytes"))?;
        Ok(EvmSignature(array))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// A 32-byte replay-guard nonce, hex-encoded on the wire with 0x prefix.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HexEncodedNonce(pub [u8; 32]);

impl Debug for HexEncodedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexEncodedNonce(0x{})", hex::encode(self.0))
    }
}

static NONCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid nonce regex"));

impl<'de> Deserialize<'de> for HexEncodedNonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !NONCE_REGEX.is_match(&s) {
            return Err(serde::de::Error::custom("invalid nonce format"));
        }
        let bytes =
            hex::decode(&s[2..]).map_err(|_| serde::de::Error::custom("invalid hex in nonce"))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid length for nonce"))?;
        Ok(HexEncodedNonce(array))
    }
}

impl Serialize for HexEncodedNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// The EIP-712 message fields of an ERC-3009 authorization: who may
/// transfer how much, to whom, and during which window.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: TokenAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: HexEncodedNonce,
}

/// A signed authorization: the EIP-712 message fields plus the signature
/// over them. This is what the settlement layer verifies.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// The outbound proof of payment attached to the retried request under
/// the `X-PAYMENT` header, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version1,
    pub scheme: Scheme,
    /// Network identifier exactly as the paying wallet is configured
    /// (canonical CAIP-2 or legacy alias).
    pub network: String,
    pub payload: ExactEvmPayload,
}

/// One accepted payment option from a 402 response.
///
/// Servers in the wild attach varying amounts of metadata; everything
/// beyond the network, amount, and recipient is optional here and
/// tolerated rather than required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Network identifier the seller settles on.
    pub network: String,
    /// Price ceiling for the resource, in token base units.
    pub max_amount_required: TokenAmount,
    /// Recipient address for the transfer.
    pub pay_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The payment terms document carried in the `X-PAYMENT-REQUIRED` header
/// of a 402 response, base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    #[serde(default)]
    pub x402_version: X402Version1,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Settlement confirmation optionally carried in the `X-PAYMENT-RESPONSE`
/// header of a paid response, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementInfo {
    /// Hash of the settlement transaction.
    pub transaction_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Error decoding a base64 JSON header document.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodingError {
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TryFrom<Base64Bytes<'_>> for PaymentRequired {
    type Error = HeaderDecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(HeaderDecodingError::from)
    }
}

impl TryFrom<Base64Bytes<'_>> for SettlementInfo {
    type Error = HeaderDecodingError;

    fn try_from(value: Base64Bytes) -> Result<Self, Self::Error> {
        let decoded = value.decode()?;
        serde_json::from_slice(&decoded).map_err(HeaderDecodingError::from)
    }
}
