//! Deterministic fixed-point token amounts.
//!
//! Every quantity the store records is a [`TokenAmount`]: a signed count of
//! `10^-18` sub-units backed by an `i128`, plus a `NaN` sentinel for values
//! outside the representable range. All arithmetic is integer arithmetic;
//! no floating point is involved anywhere.
//!
//! ## Semantics
//!
//! - Any operation with a `NaN` operand yields `NaN`.
//! - Overflow of the backing integer yields `NaN` rather than wrapping.
//! - Ordering operators involving `NaN` are `false` (`partial_cmp` is `None`).
//! - `0 / 0` yields one full unit; any other division by zero is an error,
//!   never coerced to `NaN`.

use std::cmp::Ordering;
use std::fmt;
use std::num::IntErrorKind;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Number of sub-units in one full unit (18 decimal places).
pub const SUBUNITS_PER_UNIT: i128 = 1_000_000_000_000_000_000;

/// Errors from token amount parsing and division.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum AmountError {
    /// Division by zero with a non-zero dividend.
    #[snafu(display("division by zero"))]
    DivisionByZero,

    /// Input string is not a well-formed amount.
    #[snafu(display("invalid amount: {input:?}"))]
    ParseAmount {
        /// The rejected input.
        input: String,
    },
}

/// A fixed-point decimal amount with 18 sub-unit digits.
///
/// The inner `None` is the `NaN` sentinel. `PartialEq` treats two `NaN`
/// values as equal (so stored rows compare predictably); the ordering
/// operators treat `NaN` as incomparable, matching the upstream convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(Option<i128>);

impl TokenAmount {
    /// Zero sub-units.
    pub const ZERO: Self = Self(Some(0));

    /// One full unit (`10^18` sub-units).
    pub const ONE: Self = Self(Some(SUBUNITS_PER_UNIT));

    /// The not-a-number sentinel.
    pub const NAN: Self = Self(None);

    /// Creates an amount from a raw sub-unit count.
    #[inline]
    pub const fn from_subunits(subunits: i128) -> Self {
        Self(Some(subunits))
    }

    /// Creates an amount from a whole number of full units.
    ///
    /// Counts outside the representable range yield `NaN`.
    pub const fn from_units(units: i64) -> Self {
        match (units as i128).checked_mul(SUBUNITS_PER_UNIT) {
            Some(subunits) => Self(Some(subunits)),
            None => Self::NAN,
        }
    }

    /// Parses a raw sub-unit count from its decimal string form.
    ///
    /// Values whose magnitude exceeds the backing integer parse to `NaN`;
    /// malformed input is an error.
    pub fn from_subunits_str(s: &str) -> Result<Self, AmountError> {
        match s.parse::<i128>() {
            Ok(subunits) => Ok(Self(Some(subunits))),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Ok(Self::NAN),
                _ => Err(AmountError::ParseAmount { input: s.to_string() }),
            },
        }
    }

    /// Returns the raw sub-unit count, or `None` for `NaN`.
    #[inline]
    pub const fn subunits(self) -> Option<i128> {
        self.0
    }

    /// True if this is the `NaN` sentinel.
    #[inline]
    pub const fn is_nan(self) -> bool {
        self.0.is_none()
    }

    /// True if this is exactly zero. `NaN` is not zero.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == Some(0)
    }

    fn lift2(self, rhs: Self, f: impl FnOnce(i128, i128) -> Option<i128>) -> Self {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => Self(f(a, b)),
            _ => Self::NAN,
        }
    }

    /// Fixed-point multiplication: `(a * b) / 10^18`.
    ///
    /// `NaN` operands and overflow yield `NaN`.
    pub fn checked_mul(self, rhs: Self) -> Self {
        self.lift2(rhs, |a, b| {
            if let Some(product) = a.checked_mul(b) {
                return Some(product / SUBUNITS_PER_UNIT);
            }
            // Split a into whole units and a sub-unit remainder so each
            // partial product stays in range. |r| < 10^18, so r * b only
            // overflows when |b| > ~1.7e20; b / 10^18 is non-zero there.
            let q = a / SUBUNITS_PER_UNIT;
            let r = a % SUBUNITS_PER_UNIT;
            let whole = q.checked_mul(b)?;
            let frac = match r.checked_mul(b) {
                Some(product) => product / SUBUNITS_PER_UNIT,
                None => r.checked_mul(b / SUBUNITS_PER_UNIT)?,
            };
            whole.checked_add(frac)
        })
    }

    /// Fixed-point division: `(a * 10^18) / b`.
    ///
    /// `0 / 0` yields [`TokenAmount::ONE`] by preserved upstream convention.
    /// Any other division by zero is [`AmountError::DivisionByZero`].
    /// `NaN` operands yield `NaN`; overflow yields `NaN`.
    pub fn checked_div(self, rhs: Self) -> Result<Self, AmountError> {
        let (a, b) = match (self.0, rhs.0) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(Self::NAN),
        };
        if b == 0 {
            if a == 0 {
                return Ok(Self::ONE);
            }
            return Err(AmountError::DivisionByZero);
        }
        Ok(Self(Self::div_scaled(a, b)))
    }

    fn div_scaled(a: i128, b: i128) -> Option<i128> {
        if let Some(scaled) = a.checked_mul(SUBUNITS_PER_UNIT) {
            return Some(scaled / b);
        }
        let q = a / b;
        let r = a % b;
        let whole = q.checked_mul(SUBUNITS_PER_UNIT)?;
        // |r| < |b|; r * 10^18 only overflows when |b| > ~1.7e20, and in
        // that range b / 10^18 is non-zero.
        let frac = match r.checked_mul(SUBUNITS_PER_UNIT) {
            Some(scaled) => scaled / b,
            None => r / (b / SUBUNITS_PER_UNIT),
        };
        whole.checked_add(frac)
    }
}

impl Add for TokenAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.lift2(rhs, i128::checked_add)
    }
}

impl Sub for TokenAmount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.lift2(rhs, i128::checked_sub)
    }
}

impl Neg for TokenAmount {
    type Output = Self;

    fn neg(self) -> Self {
        match self.0 {
            Some(v) => Self(v.checked_neg()),
            None => Self::NAN,
        }
    }
}

impl PartialOrd for TokenAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(subunits) = self.0 else {
            return f.write_str("NaN");
        };
        let sign = if subunits < 0 { "-" } else { "" };
        let magnitude = subunits.unsigned_abs();
        let units = magnitude / SUBUNITS_PER_UNIT as u128;
        let frac = magnitude % SUBUNITS_PER_UNIT as u128;
        if frac == 0 {
            return write!(f, "{sign}{units}");
        }
        let mut frac_digits = format!("{frac:018}");
        while frac_digits.ends_with('0') {
            frac_digits.pop();
        }
        write!(f, "{sign}{units}.{frac_digits}")
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    /// Parses a decimal string with up to 18 fractional digits, or `"NaN"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "NaN" {
            return Ok(Self::NAN);
        }
        let parse_err = || AmountError::ParseAmount { input: s.to_string() };

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(parse_err());
        }
        if frac_part.len() > 18 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(parse_err());
        }

        let units = match int_part.parse::<i128>() {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow) => return Ok(Self::NAN),
            Err(_) => return Err(parse_err()),
        };
        let mut frac: i128 = 0;
        if !frac_part.is_empty() {
            let padded = format!("{frac_part:0<18}");
            frac = padded.parse::<i128>().map_err(|_| parse_err())?;
        }

        let magnitude = units
            .checked_mul(SUBUNITS_PER_UNIT)
            .and_then(|u| u.checked_add(frac));
        Ok(match magnitude {
            Some(m) if negative => Self(m.checked_neg()),
            Some(m) => Self(Some(m)),
            None => Self::NAN,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_one_full_unit_from_subunits_string() {
        let amount = TokenAmount::from_subunits_str("1000000000000000000").unwrap();
        assert_eq!(amount, TokenAmount::ONE);
    }

    #[test]
    fn test_subunits_overflow_parses_to_nan() {
        // 40 digits, beyond the i128 range.
        let amount = TokenAmount::from_subunits_str("1701411834604692317316873037158841057280")
            .unwrap();
        assert!(amount.is_nan());
    }

    #[test]
    fn test_malformed_subunits_string_is_error() {
        assert!(TokenAmount::from_subunits_str("12.5").is_err());
        assert!(TokenAmount::from_subunits_str("abc").is_err());
        assert!(TokenAmount::from_subunits_str("").is_err());
    }

    #[test]
    fn test_zero_divided_by_zero_is_one() {
        let result = TokenAmount::ZERO.checked_div(TokenAmount::ZERO).unwrap();
        assert_eq!(result, TokenAmount::ONE);
    }

    #[test]
    fn test_nonzero_divided_by_zero_is_error() {
        let result = TokenAmount::ONE.checked_div(TokenAmount::ZERO);
        assert_eq!(result, Err(AmountError::DivisionByZero));
    }

    #[test]
    fn test_nan_propagates_through_arithmetic() {
        let x = TokenAmount::from_units(5);
        assert!((x + TokenAmount::NAN).is_nan());
        assert!((TokenAmount::NAN - x).is_nan());
        assert!((-TokenAmount::NAN).is_nan());
        assert!(x.checked_mul(TokenAmount::NAN).is_nan());
        assert!(TokenAmount::NAN.checked_div(x).unwrap().is_nan());
        // NaN dividend with zero divisor still yields NaN, not an error.
        assert!(TokenAmount::NAN.checked_div(TokenAmount::ZERO).unwrap().is_nan());
    }

    #[test]
    fn test_ordering_operators_on_nan_are_false() {
        let x = TokenAmount::from_units(1);
        assert!(!(TokenAmount::NAN < x));
        assert!(!(TokenAmount::NAN > x));
        assert!(!(TokenAmount::NAN <= x));
        assert!(!(x >= TokenAmount::NAN));
        assert!(TokenAmount::NAN.partial_cmp(&TokenAmount::NAN).is_none());
    }

    #[test]
    fn test_addition_overflow_is_nan() {
        let max = TokenAmount::from_subunits(i128::MAX);
        assert!((max + TokenAmount::ONE).is_nan());
        assert!((-TokenAmount::from_subunits(i128::MIN)).is_nan());
    }

    #[test]
    fn test_fixed_point_multiplication() {
        let two = TokenAmount::from_units(2);
        let three_halves = "1.5".parse::<TokenAmount>().unwrap();
        assert_eq!(two.checked_mul(three_halves), TokenAmount::from_units(3));
        assert_eq!(two.checked_mul(TokenAmount::ZERO), TokenAmount::ZERO);
    }

    #[test]
    fn test_fixed_point_division() {
        let three = TokenAmount::from_units(3);
        let two = TokenAmount::from_units(2);
        assert_eq!(
            three.checked_div(two).unwrap(),
            "1.5".parse::<TokenAmount>().unwrap()
        );
    }

    #[test]
    fn test_large_operand_multiplication_stays_finite() {
        // Forces the decomposed path: a * b overflows the naive product.
        let large = TokenAmount::from_units(1_000_000_000_000);
        let result = large.checked_mul(TokenAmount::from_units(2));
        assert_eq!(result, TokenAmount::from_units(2_000_000_000_000));
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(TokenAmount::from_units(7).to_string(), "7");
        assert_eq!("1.5".parse::<TokenAmount>().unwrap().to_string(), "1.5");
        assert_eq!(
            "-0.000000000000000001".parse::<TokenAmount>().unwrap().to_string(),
            "-0.000000000000000001"
        );
        assert_eq!(TokenAmount::NAN.to_string(), "NaN");
    }

    #[test]
    fn test_decimal_parse_rejects_excess_precision() {
        assert!("1.0000000000000000001".parse::<TokenAmount>().is_err());
        assert!(".".parse::<TokenAmount>().is_err());
        assert!("1.".parse::<TokenAmount>().is_ok());
        assert!("-".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn test_display_parse_round_trip() {
        for text in ["0", "42", "-3.25", "0.000000000000000123"] {
            let amount = text.parse::<TokenAmount>().unwrap();
            assert_eq!(amount.to_string(), text);
        }
    }
}
