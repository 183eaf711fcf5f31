// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Exact rational numbers.
//!
//! Known values in a plan are kept exact so `1/3` stays one third through
//! every step of evaluation. Conversion to `f64` only happens at the edge,
//! when an answer is rendered or compared with tolerance.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Longest digit run accepted from text; keeps parsing inside `i128`.
const MAX_DIGITS: usize = 36;

/// `10^38` is the largest power of ten an `i128` holds.
const MAX_DECIMAL_SCALE: i32 = 38;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RationalError {
    #[error("empty number")]
    Empty,

    #[error("not a number: '{0}'")]
    Invalid(String),

    #[error("division by zero")]
    ZeroDenominator,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Always stored in lowest terms with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    numer: i128,
    denom: i128,
}

impl Rational {
    pub const ZERO: Rational = Rational { numer: 0, denom: 1 };
    pub const ONE: Rational = Rational { numer: 1, denom: 1 };

    pub fn new(numer: i128, denom: i128) -> Result<Self, RationalError> {
        if denom == 0 {
            return Err(RationalError::ZeroDenominator);
        }
        let (mut numer, mut denom) = (numer, denom);
        if denom < 0 {
            numer = numer.checked_neg().ok_or(RationalError::Overflow)?;
            denom = denom.checked_neg().ok_or(RationalError::Overflow)?;
        }
        let g = gcd(numer, denom);
        Ok(Self {
            numer: numer / g,
            denom: denom / g,
        })
    }

    pub fn from_integer(value: i128) -> Self {
        Self { numer: value, denom: 1 }
    }

    pub fn numer(&self) -> i128 {
        self.numer
    }

    pub fn denom(&self) -> i128 {
        self.denom
    }

    pub fn is_integer(&self) -> bool {
        self.denom == 1
    }

    pub fn is_zero(&self) -> bool {
        self.numer == 0
    }

    pub fn to_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    /// Parse `3`, `-2.5`, `1.5e3`, `1/3`, `2.5/0.5`.
    pub fn parse(text: &str) -> Result<Self, RationalError> {
        let text = text.trim().replace('\u{2212}', "-");
        if text.is_empty() {
            return Err(RationalError::Empty);
        }
        match text.split_once('/') {
            Some((n, d)) => {
                let n = parse_decimal(n.trim())?;
                let d = parse_decimal(d.trim())?;
                n.checked_div(&d)
            }
            None => parse_decimal(&text),
        }
    }

    /// Shortest decimal (≤ 12 fractional digits) used when rendering answers.
    pub fn to_decimal_string(&self) -> String {
        if self.is_integer() {
            return self.numer.to_string();
        }
        let value = self.to_f64();
        let rendered = format!("{:.12}", value);
        let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
        if trimmed.is_empty() || trimmed == "-" || trimmed == "-0" {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn checked_add(&self, other: &Rational) -> Result<Rational, RationalError> {
        let g = gcd(self.denom, other.denom);
        let lhs = self.numer.checked_mul(other.denom / g).ok_or(RationalError::Overflow)?;
        let rhs = other.numer.checked_mul(self.denom / g).ok_or(RationalError::Overflow)?;
        let numer = lhs.checked_add(rhs).ok_or(RationalError::Overflow)?;
        let denom = (self.denom / g).checked_mul(other.denom).ok_or(RationalError::Overflow)?;
        Rational::new(numer, denom)
    }

    pub fn checked_neg(&self) -> Result<Rational, RationalError> {
        Ok(Rational {
            numer: self.numer.checked_neg().ok_or(RationalError::Overflow)?,
            denom: self.denom,
        })
    }

    pub fn checked_sub(&self, other: &Rational) -> Result<Rational, RationalError> {
        self.checked_add(&other.checked_neg()?)
    }

    pub fn checked_mul(&self, other: &Rational) -> Result<Rational, RationalError> {
        // cross-reduce first so intermediate products stay small
        let g1 = gcd(self.numer, other.denom);
        let g2 = gcd(other.numer, self.denom);
        let numer = (self.numer / g1)
            .checked_mul(other.numer / g2)
            .ok_or(RationalError::Overflow)?;
        let denom = (self.denom / g2)
            .checked_mul(other.denom / g1)
            .ok_or(RationalError::Overflow)?;
        Rational::new(numer, denom)
    }

    pub fn checked_div(&self, other: &Rational) -> Result<Rational, RationalError> {
        if other.numer == 0 {
            return Err(RationalError::ZeroDenominator);
        }
        self.checked_mul(&Rational::new(other.denom, other.numer)?)
    }

    /// Integer powers only; negative exponents invert.
    pub fn checked_pow(&self, exponent: i32) -> Result<Rational, RationalError> {
        if exponent == 0 {
            return Ok(Rational::ONE);
        }
        match (self.numer, self.denom) {
            (0, _) if exponent < 0 => return Err(RationalError::ZeroDenominator),
            (0, _) | (1, 1) => return Ok(*self),
            (-1, 1) => {
                return Ok(if exponent % 2 == 0 { Rational::ONE } else { *self });
            }
            _ => {}
        }

        // numerator or denominator at least doubles on every squaring here
        let mut result = Rational::ONE;
        let mut base = *self;
        let mut remaining = exponent.unsigned_abs();
        loop {
            if remaining & 1 == 1 {
                result = result.checked_mul(&base)?;
            }
            remaining >>= 1;
            if remaining == 0 {
                break;
            }
            base = base.checked_mul(&base)?;
        }
        if exponent < 0 {
            Rational::ONE.checked_div(&result)
        } else {
            Ok(result)
        }
    }
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    if a == 0 {
        1
    } else {
        a as i128
    }
}

fn parse_decimal(text: &str) -> Result<Rational, RationalError> {
    if text.is_empty() {
        return Err(RationalError::Empty);
    }
    let invalid = || RationalError::Invalid(text.to_string());

    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(pos) => {
            let exp: i32 = text[pos + 1..].trim_start_matches('+').parse().map_err(|_| invalid())?;
            (&text[..pos], exp)
        }
        None => (text, 0),
    };

    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let all_digits = format!("{}{}", int_part, frac_part);
    let significant = all_digits.trim_start_matches('0');
    if significant.len() > MAX_DIGITS {
        return Err(RationalError::Overflow);
    }

    let mut numer: i128 = if significant.is_empty() {
        0
    } else {
        significant.parse().map_err(|_| invalid())?
    };
    if negative {
        numer = -numer;
    }

    if numer == 0 {
        return Ok(Rational::ZERO);
    }
    let frac_len = i32::try_from(frac_part.len()).map_err(|_| RationalError::Overflow)?;
    let scale = exponent.checked_sub(frac_len).ok_or(RationalError::Overflow)?;
    if scale.unsigned_abs() > MAX_DECIMAL_SCALE as u32 {
        return Err(RationalError::Overflow);
    }
    let ten = Rational::from_integer(10);
    Rational::from_integer(numer).checked_mul(&ten.checked_pow(scale)?)
}

impl FromStr for Rational {
    type Err = RationalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rational::parse(s)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numer.checked_mul(other.denom), other.numer.checked_mul(self.denom)) {
            (Some(lhs), Some(rhs)) => lhs.cmp(&rhs),
            _ => self.to_f64().total_cmp(&other.to_f64()),
        }
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Rational::from_integer(value as i128)
    }
}

/// Integers serialize as JSON numbers, everything else as an exact `"n/d"` string.
impl Serialize for Rational {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(self.numer) {
            Ok(n) if self.denom == 1 => serializer.serialize_i64(n),
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Rational {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RationalVisitor;

        impl Visitor<'_> for RationalVisitor {
            type Value = Rational;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number or a fraction string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Rational, E> {
                Ok(Rational::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Rational, E> {
                Ok(Rational::from_integer(v as i128))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Rational, E> {
                if !v.is_finite() {
                    return Err(E::custom("non-finite number"));
                }
                Rational::parse(&v.to_string()).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Rational, E> {
                Rational::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RationalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(text: &str) -> Rational {
        Rational::parse(text).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(r("3"), Rational::from_integer(3));
        assert_eq!(r("-2.5"), Rational::new(-5, 2).unwrap());
        assert_eq!(r("1/3"), Rational::new(1, 3).unwrap());
        assert_eq!(r(" 2/4 "), Rational::new(1, 2).unwrap());
        assert_eq!(r("1.5e3"), Rational::from_integer(1500));
        assert_eq!(r("2.5E-2"), Rational::new(1, 40).unwrap());
        assert_eq!(r(".5"), Rational::new(1, 2).unwrap());
        assert_eq!(r("\u{2212}4"), Rational::from_integer(-4));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Rational::parse(""), Err(RationalError::Empty));
        assert!(matches!(Rational::parse("abc"), Err(RationalError::Invalid(_))));
        assert_eq!(Rational::parse("1/0"), Err(RationalError::ZeroDenominator));
        assert!(Rational::parse("1.2.3").is_err());
    }

    #[test]
    fn test_exact_arithmetic() {
        let third = r("1/3");
        let sum = third.checked_add(&third).unwrap().checked_add(&third).unwrap();
        assert_eq!(sum, Rational::ONE);

        let doubled = third.checked_mul(&Rational::from_integer(2)).unwrap();
        assert_eq!(doubled.to_string(), "2/3");
        assert_eq!(r("3/4").checked_div(&r("3/8")).unwrap(), Rational::from_integer(2));
        assert_eq!(r("2").checked_pow(-2).unwrap(), r("1/4"));
        assert!(Rational::ONE.checked_div(&Rational::ZERO).is_err());
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(r("1/3") < r("0.34"));
        assert_eq!(r("25").to_decimal_string(), "25");
        assert_eq!(r("1/4").to_decimal_string(), "0.25");
        assert_eq!(r("-1/2").to_string(), "-1/2");
    }

    #[test]
    fn test_pow_of_unit_bases_is_immediate() {
        assert_eq!(Rational::ONE.checked_pow(2_000_000_000), Ok(Rational::ONE));
        assert_eq!(Rational::ONE.checked_pow(i32::MIN), Ok(Rational::ONE));
        assert_eq!(r("-1").checked_pow(2_000_000_001), Ok(r("-1")));
        assert_eq!(r("-1").checked_pow(i32::MIN), Ok(Rational::ONE));
        assert_eq!(Rational::ZERO.checked_pow(i32::MAX), Ok(Rational::ZERO));
        assert_eq!(Rational::ZERO.checked_pow(-3), Err(RationalError::ZeroDenominator));
        assert_eq!(r("7/3").checked_pow(0), Ok(Rational::ONE));
    }

    #[test]
    fn test_pow_large_exponents_overflow() {
        assert_eq!(r("2").checked_pow(i32::MAX), Err(RationalError::Overflow));
        assert_eq!(r("1/2").checked_pow(i32::MIN), Err(RationalError::Overflow));
        assert_eq!(r("2").checked_pow(126), Ok(Rational::from_integer(1 << 126)));
        assert_eq!(r("-2/3").checked_pow(3), Ok(r("-8/27")));
        assert_eq!(r("10").checked_pow(-3), Ok(r("1/1000")));
    }

    #[test]
    fn test_parse_extreme_exponents() {
        assert_eq!(Rational::parse("1.5e-2147483648"), Err(RationalError::Overflow));
        assert_eq!(Rational::parse("1.5e2147483647"), Err(RationalError::Overflow));
        assert_eq!(Rational::parse("1e39"), Err(RationalError::Overflow));
        assert_eq!(Rational::parse("0e2147483647"), Ok(Rational::ZERO));
        assert_eq!(Rational::parse("0.000e-2147483648"), Ok(Rational::ZERO));
        assert_eq!(r("1e38").numer(), 10i128.pow(38));
        assert!(matches!(Rational::parse("1e99999999999"), Err(RationalError::Invalid(_))));
    }

    #[test]
    fn test_tiny_negative_renders_as_zero() {
        let tiny = Rational::new(-1, 10i128.pow(20)).unwrap();
        assert_eq!(tiny.to_decimal_string(), "0");
        assert_eq!(Rational::new(-1, 3).unwrap().to_decimal_string(), "-0.333333333333");
        assert_eq!(r("-0").to_decimal_string(), "0");
    }

    #[test]
    fn test_serde() {
        assert_eq!(serde_json::to_string(&r("25")).unwrap(), "25");
        assert_eq!(serde_json::to_string(&r("1/3")).unwrap(), "\"1/3\"");
        let parsed: Vec<Rational> = serde_json::from_str(r#"[10, 2.5, "1/3", "-7"]"#).unwrap();
        assert_eq!(parsed, vec![r("10"), r("5/2"), r("1/3"), r("-7")]);
    }
}
