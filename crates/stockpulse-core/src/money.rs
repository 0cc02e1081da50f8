//! # Money Module
//!
//! Provides the `Money` type for unit prices, unit costs and every
//! aggregate derived from them (revenue, AOV, WAC, valuation, COGS).
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With f64:                                                              │
//! │    3 × 0.1 + 7 × 0.2 = 1.7000000000000002  ❌                           │
//! │                                                                         │
//! │  Uploads carry prices like 0.1, 19.99, 2.345 straight from a CSV.      │
//! │  Integer cents would truncate the third decimal.                       │
//! │                                                                         │
//! │  OUR SOLUTION: base-10 Decimal                                          │
//! │    "0.1" parses to exactly 1 × 10⁻¹                                    │
//! │    Σ(qty × unit_price) is exact to the precision of the input          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockpulse_core::money::Money;
//!
//! let price: Money = "10.99".parse().unwrap();
//! let line = price.checked_multiply_quantity(3).unwrap();
//! assert_eq!(line.to_string(), "32.97");
//! ```
//!
//! ## Overflow
//! `Decimal` arithmetic panics past ±7.9 × 10²⁸, so sums and products on
//! `Money` are checked and return `None` instead.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value held as an exact decimal.
///
/// Serializes as a decimal string (`"19.00"`) so no precision is lost on the
/// way to JSON consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiplies money by a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use stockpulse_core::money::Money;
    ///
    /// let unit_cost: Money = "7".parse().unwrap();
    /// assert_eq!(unit_cost.checked_multiply_quantity(30).unwrap().to_string(), "210");
    /// ```
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(Decimal::from(qty)).map(Money)
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Divides by a count, returning zero when the count is zero.
    ///
    /// Used for averages (AOV, weighted-average cost) where an empty
    /// denominator is a normal business situation, not an error. The
    /// quotient is normalized so `350 / 70` reads `5`, not `5.0000…`.
    pub fn divide_or_zero(&self, count: i64) -> Self {
        if count == 0 {
            return Money::zero();
        }
        Money((self.0 / Decimal::from(count)).normalize())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a CSV cell. Accepts plain (`"12.50"`) and scientific (`"1.25e1"`)
/// notation.
impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(Money)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_and_scientific() {
        assert_eq!(m("12.50").to_string(), "12.50");
        assert_eq!(m(" 3 ").to_string(), "3");
        assert_eq!(m("1.25e1"), m("12.5"));
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn test_exact_sum_no_float_drift() {
        // 3 × 0.1 + 7 × 0.2 is 1.7 exactly, unlike f64
        let a = m("0.1").checked_multiply_quantity(3).unwrap();
        let b = m("0.2").checked_multiply_quantity(7).unwrap();
        assert_eq!(a.checked_add(b), Some(m("1.7")));
    }

    #[test]
    fn test_overflow_is_none_not_panic() {
        let huge = Money(Decimal::MAX);
        assert_eq!(huge.checked_add(m("1")), None);
        assert_eq!(m("100000000000").checked_multiply_quantity(9_000_000_000_000_000_000), None);
        assert_eq!(m("1").checked_multiply_quantity(i64::MIN), Some(m("-9223372036854775808")));
    }

    #[test]
    fn test_divide_or_zero() {
        assert_eq!(m("350").divide_or_zero(70).to_string(), "5");
        assert_eq!(m("10").divide_or_zero(4).to_string(), "2.5");
        assert_eq!(m("10").divide_or_zero(0), Money::zero());
    }

    #[test]
    fn test_sign() {
        assert!(m("-0.01").is_negative());
        assert!(!m("0").is_negative());
        assert!(!m("-0").is_negative());
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&m("19.00")).unwrap();
        assert_eq!(json, "\"19.00\"");
    }
}
