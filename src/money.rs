//! Fixed-point USD amounts and conversion to on-chain token units.
//!
//! Budgets, prices, and spend totals are denominated in USD and compared
//! exactly: [`UsdAmount`] wraps a [`Decimal`] so that `$0.01` boundaries
//! never drift the way binary floats do. Floats only exist at the API
//! edge, via [`TryFrom<f64>`].
//!
//! Conversion to USDC base units (6 decimals) truncates toward zero.
//! Rounding in the payer's favor is acceptable; rounding up and
//! overcommitting funds by accident is not.

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::types::TokenAmount;

/// Decimal places of the USDC token: 1 USDC = 10^6 base units.
pub const USDC_DECIMALS: u32 = 6;

mod bounds {
    use super::*;

    pub const MAX_STR: &str = "999999999";

    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));

    /// `MAX` scaled to token units; fits comfortably in `u128` and `i128`.
    pub const MAX_TOKEN_UNITS: u128 = 999_999_999_000_000;
}

static CURRENCY_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid currency regex"));

/// A non-negative USD value with exact decimal precision.
///
/// Accepts human-readable input like `"$0.01"` or `"1,000"`. Bounded to
/// `[0, 999999999]`, the range the protocol's token amounts can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsdAmount(Decimal);

/// Errors from parsing or converting a USD amount.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UsdAmountError {
    /// The input could not be parsed as a number.
    #[error("invalid USD amount format")]
    InvalidFormat,
    /// The value is negative.
    #[error("negative USD amount is not allowed")]
    Negative,
    /// The value is above the supported maximum.
    #[error("USD amount must not exceed {}", bounds::MAX_STR)]
    OutOfRange,
}

impl UsdAmount {
    pub const ZERO: UsdAmount = UsdAmount(Decimal::ZERO);

    /// Parses a human-readable currency string.
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing. The result must be non-negative and within bounds.
    pub fn parse(input: &str) -> Result<Self, UsdAmountError> {
        let cleaned = CURRENCY_NOISE.replace_all(input, "").to_string();
        let parsed = Decimal::from_str(&cleaned).map_err(|_| UsdAmountError::InvalidFormat)?;
        Self::checked(parsed)
    }

    fn checked(value: Decimal) -> Result<Self, UsdAmountError> {
        if value.is_sign_negative() {
            return Err(UsdAmountError::Negative);
        }
        if value > *bounds::MAX {
            return Err(UsdAmountError::OutOfRange);
        }
        Ok(UsdAmount(value))
    }

    /// Converts to USDC base units, truncating toward zero.
    ///
    /// Fractions finer than [`USDC_DECIMALS`] are dropped, never rounded
    /// up: `$0.0000019` becomes 1 unit, not 2.
    pub fn to_token_units(&self) -> TokenAmount {
        let scaled = (self.0 * Decimal::from(10u64.pow(USDC_DECIMALS))).trunc();
        let units = scaled.to_u128().expect("bounded by MAX and non-negative");
        TokenAmount::from(units)
    }

    /// Converts USDC base units back to USD, exactly.
    ///
    /// Fails with [`UsdAmountError::OutOfRange`] if the amount exceeds
    /// what [`UsdAmount`] can express.
    pub fn from_token_units(units: TokenAmount) -> Result<Self, UsdAmountError> {
        let raw = u128::try_from(units.as_u256()).map_err(|_| UsdAmountError::OutOfRange)?;
        if raw > bounds::MAX_TOKEN_UNITS {
            return Err(UsdAmountError::OutOfRange);
        }
        Ok(UsdAmount(Decimal::from_i128_with_scale(
            raw as i128,
            USDC_DECIMALS,
        )))
    }

    /// `self - rhs`, clamped at zero.
    pub fn saturating_sub(&self, rhs: UsdAmount) -> UsdAmount {
        if rhs.0 >= self.0 {
            UsdAmount::ZERO
        } else {
            UsdAmount(self.0 - rhs.0)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add for UsdAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        UsdAmount(self.0 + rhs.0)
    }
}

impl AddAssign for UsdAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl FromStr for UsdAmount {
    type Err = UsdAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsdAmount::parse(s)
    }
}

impl TryFrom<&str> for UsdAmount {
    type Error = UsdAmountError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        UsdAmount::parse(value)
    }
}

impl TryFrom<f64> for UsdAmount {
    type Error = UsdAmountError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(UsdAmountError::InvalidFormat)?;
        Self::checked(decimal)
    }
}

impl From<u64> for UsdAmount {
    fn from(value: u64) -> Self {
        UsdAmount(Decimal::from(value))
    }
}

impl Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.normalize().to_string())
    }
}

impl<'de> Deserialize<'de> for UsdAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UsdAmount::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(s: &str) -> UsdAmount {
        UsdAmount::parse(s).unwrap()
    }

    #[test]
    fn parses_currency_noise() {
        assert_eq!(usd("$10.50"), usd("10.50"));
        assert_eq!(usd("1,000"), usd("1000"));
        assert_eq!(usd("0"), UsdAmount::ZERO);
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(matches!(
            UsdAmount::parse("-1"),
            Err(UsdAmountError::Negative)
        ));
        assert!(UsdAmount::parse("not a number").is_err());
        assert!(matches!(
            UsdAmount::parse("1000000000"),
            Err(UsdAmountError::OutOfRange)
        ));
        assert!(matches!(
            UsdAmount::try_from(-0.5),
            Err(UsdAmountError::Negative)
        ));
    }

    #[test]
    fn known_unit_conversions() {
        assert_eq!(usd("1.0").to_token_units(), TokenAmount::from(1_000_000u64));
        assert_eq!(
            UsdAmount::try_from(0.01).unwrap().to_token_units(),
            TokenAmount::from(10_000u64)
        );
        assert_eq!(usd("0.01").to_token_units(), TokenAmount::from(10_000u64));
        assert_eq!(
            UsdAmount::from_token_units(TokenAmount::from(1u64)).unwrap(),
            usd("0.000001")
        );
    }

    #[test]
    fn conversion_truncates_toward_zero() {
        // 0.0000019 USD = 1.9 units; must become 1, never 2.
        assert_eq!(usd("0.0000019").to_token_units(), TokenAmount::from(1u64));
        assert_eq!(usd("0.0000001").to_token_units(), TokenAmount::from(0u64));
    }

    #[test]
    fn round_trip_is_exact_within_six_digits() {
        for s in ["0.000001", "0.01", "0.105", "1", "3.999999", "999999999"] {
            let amount = usd(s);
            assert_eq!(
                UsdAmount::from_token_units(amount.to_token_units()).unwrap(),
                amount,
                "round trip failed for {s}"
            );
        }
    }

    #[test]
    fn from_token_units_rejects_oversized_amounts() {
        let too_big = TokenAmount::from(999_999_999_000_001u128);
        assert!(matches!(
            UsdAmount::from_token_units(too_big),
            Err(UsdAmountError::OutOfRange)
        ));
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        assert_eq!(usd("1").saturating_sub(usd("0.25")), usd("0.75"));
        assert_eq!(usd("1").saturating_sub(usd("2")), UsdAmount::ZERO);
    }

    #[test]
    fn exact_comparison_at_the_cent_boundary() {
        let spent = usd("0.1") + usd("0.2");
        assert_eq!(spent, usd("0.3"));
        assert!(spent <= usd("0.3"));
    }

    #[test]
    fn serde_round_trip() {
        let amount = usd("0.01");
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"0.01\"");
        assert_eq!(serde_json::from_str::<UsdAmount>(&json).unwrap(), amount);
    }
}
