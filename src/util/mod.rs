//! Helper types shared across the crate.

pub mod b64;

pub use b64::Base64Bytes;
