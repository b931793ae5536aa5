//! Unix timestamps and the clock capability for authorization windows.
//!
//! ERC-3009 authorizations are time-boxed: `validAfter` and `validBefore`
//! bound when the signed transfer may be settled. [`UnixTimestamp`] is the
//! wire representation of those bounds. The [`Clock`] trait is how the
//! current time enters the crate: the wallet and negotiator never read
//! the system clock directly, so tests can substitute a [`FixedClock`]
//! and get reproducible records and windows.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// Seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// Serialized as a stringified integer: JSON consumers on the other side
/// of the protocol are JavaScript, whose `Number` cannot safely hold all
/// 64-bit values.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl UnixTimestamp {
    /// Creates a [`UnixTimestamp`] from a raw seconds value.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Reads the current system time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns the raw seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

/// Source of the current time.
///
/// Injected into [`Wallet`](crate::wallet::Wallet) and
/// [`PaymentNegotiator`](crate::negotiator::PaymentNegotiator); production
/// code uses [`SystemClock`], tests pin a [`FixedClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixTimestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTimestamp {
        UnixTimestamp::now()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub UnixTimestamp);

impl Clock for FixedClock {
    fn now(&self) -> UnixTimestamp {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let ts = UnixTimestamp::from_secs(1699999999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
    }

    #[test]
    fn deserializes_from_string() {
        let ts: UnixTimestamp = serde_json::from_str("\"1699999999\"").unwrap();
        assert_eq!(ts.as_secs(), 1699999999);
        assert!(serde_json::from_str::<UnixTimestamp>("\"-5\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("1699999999").is_err());
    }

    #[test]
    fn add_extends_the_window() {
        let ts = UnixTimestamp::from_secs(1000) + 300;
        assert_eq!(ts.as_secs(), 1300);
    }

    #[test]
    fn fixed_clock_is_deterministic() {
        let clock = FixedClock(UnixTimestamp::from_secs(42));
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().as_secs(), 42);
    }
}
