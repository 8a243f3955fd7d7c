//! # Exact Native-Unit Amounts
//!
//! The ledger only understands integers in the smallest indivisible unit
//! (wei, 18 decimals). People type and read whole-unit decimals ("12.5 EDU").
//! [`Wei`] is the only amount type that crosses the ledger boundary, and the
//! conversion between the two forms is pure integer arithmetic: no `f64`
//! ever touches an on-chain value.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::NATIVE_DECIMALS;

/// Largest decimals value we accept. `10^38` still fits in a `u128`.
const MAX_DECIMALS: u8 = 38;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a decimal string could not be turned into a [`Wei`] amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Nothing (or only whitespace) was supplied.
    #[error("amount is empty")]
    Empty,

    /// The input carried a sign. Amounts are unsigned at the ledger boundary;
    /// a leading `-` is how a non-positive amount usually shows up.
    #[error("amount must not carry a sign: {0:?}")]
    Signed(String),

    /// The input is not `digits[.digits]`.
    #[error("not a decimal amount: {0:?}")]
    Malformed(String),

    /// More fractional digits than the unit can represent.
    #[error("too many decimal places: {found} (max {max})")]
    TooPrecise {
        /// Fractional digits in the input.
        found: usize,
        /// Fractional digits supported by the unit.
        max: u8,
    },

    /// The value does not fit in 128 bits of smallest units.
    #[error("amount overflows the native unit range: {0:?}")]
    Overflow(String),

    /// The requested decimals are outside what a `u128` can scale to.
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u8),
}

// ---------------------------------------------------------------------------
// Wei
// ---------------------------------------------------------------------------

/// An amount in the smallest native unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(u128);

impl Wei {
    /// Zero.
    pub const ZERO: Wei = Wei(0);

    /// Wraps a raw smallest-unit integer.
    pub const fn new(raw: u128) -> Self {
        Wei(raw)
    }

    /// The raw smallest-unit integer.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Parses a whole-unit decimal in the native 18-decimal unit.
    pub fn parse_ether(text: &str) -> Result<Self, AmountError> {
        Self::parse_units(text, NATIVE_DECIMALS)
    }

    /// Parses a whole-unit decimal string into smallest units.
    ///
    /// Accepts `12`, `12.5`, `.5` and `12.` after trimming whitespace. Rejects
    /// signs, exponents, separators and anything finer than `decimals`.
    pub fn parse_units(text: &str, decimals: u8) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::UnsupportedDecimals(decimals));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(AmountError::Empty);
        }
        if text.starts_with('-') || text.starts_with('+') {
            return Err(AmountError::Signed(text.to_string()));
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(AmountError::Malformed(text.to_string()));
        }

        if fraction.len() > decimals as usize {
            return Err(AmountError::TooPrecise {
                found: fraction.len(),
                max: decimals,
            });
        }

        let overflow = || AmountError::Overflow(text.to_string());
        let scale = 10u128.pow(decimals as u32);

        let whole_value = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| overflow())?
        };

        let fraction_value = if fraction.is_empty() {
            0
        } else {
            let padding = 10u128.pow((decimals as usize - fraction.len()) as u32);
            // At most `decimals` digits, so this always fits.
            fraction.parse::<u128>().map_err(|_| overflow())? * padding
        };

        whole_value
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction_value))
            .map(Wei)
            .ok_or_else(overflow)
    }

    /// Renders the amount as a whole-unit decimal in the native unit.
    pub fn format_ether(self) -> String {
        self.format_units(NATIVE_DECIMALS)
    }

    /// Renders the amount as a whole-unit decimal with `decimals` places,
    /// trimming trailing zeros but keeping at least one fractional digit.
    pub fn format_units(self, decimals: u8) -> String {
        let decimals = decimals.min(MAX_DECIMALS);
        let scale = 10u128.pow(decimals as u32);
        let whole = self.0 / scale;
        let fraction = self.0 % scale;

        if decimals == 0 {
            return format!("{}.0", whole);
        }

        let digits = format!("{:0width$}", fraction, width = decimals as usize);
        let trimmed = digits.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{}.0", whole)
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }

    /// Returns `true` for zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Wei) -> Wei {
        Wei(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_ether())
    }
}

impl From<u128> for Wei {
    fn from(raw: u128) -> Self {
        Wei(raw)
    }
}

// JSON numbers cannot carry a u128 faithfully through most clients, so the
// wire form is a decimal string of smallest units.
impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<u128>()
            .map(Wei)
            .map_err(|e| serde::de::Error::custom(format!("invalid wei amount {:?}: {}", text, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_EDU: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn parses_whole_units() {
        assert_eq!(Wei::parse_ether("100").unwrap(), Wei::new(100 * ONE_EDU));
        assert_eq!(Wei::parse_ether("  7 ").unwrap(), Wei::new(7 * ONE_EDU));
    }

    #[test]
    fn parses_fractions_exactly() {
        assert_eq!(Wei::parse_ether("0.5").unwrap(), Wei::new(ONE_EDU / 2));
        assert_eq!(Wei::parse_ether(".5").unwrap(), Wei::new(ONE_EDU / 2));
        assert_eq!(Wei::parse_ether("5.").unwrap(), Wei::new(5 * ONE_EDU));
        assert_eq!(
            Wei::parse_ether("1.000000000000000001").unwrap(),
            Wei::new(ONE_EDU + 1)
        );
        // 0.1 + 0.2 is exactly 0.3 here, unlike in f64.
        let sum = Wei::parse_ether("0.1")
            .unwrap()
            .checked_add(Wei::parse_ether("0.2").unwrap())
            .unwrap();
        assert_eq!(sum, Wei::parse_ether("0.3").unwrap());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Wei::parse_ether(""), Err(AmountError::Empty));
        assert_eq!(Wei::parse_ether("   "), Err(AmountError::Empty));
        assert!(matches!(Wei::parse_ether("-1"), Err(AmountError::Signed(_))));
        assert!(matches!(Wei::parse_ether("+1"), Err(AmountError::Signed(_))));
        assert!(matches!(Wei::parse_ether("1e18"), Err(AmountError::Malformed(_))));
        assert!(matches!(Wei::parse_ether("1,5"), Err(AmountError::Malformed(_))));
        assert!(matches!(Wei::parse_ether("."), Err(AmountError::Malformed(_))));
        assert!(matches!(Wei::parse_ether("1.2.3"), Err(AmountError::Malformed(_))));
        assert!(matches!(
            Wei::parse_ether("0.0000000000000000001"),
            Err(AmountError::TooPrecise { found: 19, max: 18 })
        ));
    }

    #[test]
    fn rejects_overflow() {
        let huge = "340282366920938463463374607432";
        assert!(matches!(Wei::parse_ether(huge), Err(AmountError::Overflow(_))));
    }

    #[test]
    fn zero_parses_but_is_zero() {
        assert!(Wei::parse_ether("0").unwrap().is_zero());
        assert!(Wei::parse_ether("0.000").unwrap().is_zero());
    }

    #[test]
    fn formats_like_a_wallet() {
        assert_eq!(Wei::ZERO.format_ether(), "0.0");
        assert_eq!(Wei::new(150 * ONE_EDU).format_ether(), "150.0");
        assert_eq!(Wei::new(ONE_EDU / 2).format_ether(), "0.5");
        assert_eq!(Wei::new(ONE_EDU + 1).format_ether(), "1.000000000000000001");
        assert_eq!(Wei::new(1234).format_units(2), "12.34");
        assert_eq!(Wei::new(1200).format_units(2), "12.0");
    }

    #[test]
    fn format_then_parse_is_lossless_at_the_edges() {
        for raw in [1u128, ONE_EDU - 1, u128::MAX / 10] {
            let wei = Wei::new(raw);
            assert_eq!(Wei::parse_ether(&wei.format_ether()).unwrap(), wei);
        }
    }

    #[test]
    fn serializes_as_decimal_string() {
        let wei = Wei::new(10 * ONE_EDU);
        let json = serde_json::to_string(&wei).unwrap();
        assert_eq!(json, "\"10000000000000000000\"");
        let back: Wei = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wei);
        assert!(serde_json::from_str::<Wei>("\"ten\"").is_err());
    }

    #[test]
    fn saturating_sub_clamps() {
        assert_eq!(Wei::new(5).saturating_sub(Wei::new(9)), Wei::ZERO);
        assert_eq!(Wei::new(9).checked_sub(Wei::new(5)), Some(Wei::new(4)));
        assert_eq!(Wei::new(5).checked_sub(Wei::new(9)), None);
    }
}
