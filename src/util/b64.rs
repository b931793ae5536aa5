//! Base64 encoding and decoding for x402 payment headers.
//!
//! Both sides of the protocol carry JSON documents in HTTP headers as
//! base64: the inbound `X-PAYMENT-REQUIRED` terms, the outbound
//! `X-PAYMENT` proof, and the optional `X-PAYMENT-RESPONSE` confirmation.
//! [`Base64Bytes`] wraps the encoded form with copy-on-write semantics so
//! header bytes can be decoded without an intermediate allocation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// Bytes holding a base64-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the base64 string bytes into the raw payload.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes a raw payload into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let encoded = Base64Bytes::encode(b"{\"accepts\":[]}");
        assert_eq!(encoded.to_string(), "eyJhY2NlcHRzIjpbXX0=");
        assert_eq!(encoded.decode().unwrap(), b"{\"accepts\":[]}");
    }

    #[test]
    fn decode_rejects_invalid_input() {
        let bogus = Base64Bytes::from(b"not base64!!".as_ref());
        assert!(bogus.decode().is_err());
    }
}
