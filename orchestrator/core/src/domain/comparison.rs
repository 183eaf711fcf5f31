// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deterministic answer comparison.
//!
//! Answers arrive as free text: `25`, `25.0 m/s`, `2.5e3`, `2.5×10^3 J`,
//! `\boxed{3/4}`, `1,200 km`, `40%`. [`parse_quantity`] reads the leading
//! number and an optional unit; [`numeric_equivalent`] compares two answers
//! under a relative tolerance after scaling recognised SI prefixes.

use once_cell::sync::Lazy;
use regex::Regex;

use super::rational::Rational;

pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-3;

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?P<mantissa>[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)(?:\s*/\s*(?P<denom>\d+(?:\.\d+)?))?(?:\s*\*\s*10\s*\^\s*\{?\s*\(?(?P<exp>[-+]?\d+)\)?\s*\}?)?\s*(?P<rest>.*)$",
    )
    .expect("Invalid number regex")
});

static THOUSANDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d),(\d{3})\b").expect("Invalid thousands regex"));

static BOXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\boxed\{([^{}]*)\}").expect("Invalid boxed regex"));

/// Units that are not prefix + base, checked before prefixes are stripped
const WHOLE_UNITS: [(&str, f64, &str); 12] = [
    ("min", 60.0, "s"),
    ("h", 3600.0, "s"),
    ("hr", 3600.0, "s"),
    ("mol", 1.0, "mol"),
    ("pa", 1.0, "Pa"),
    ("%", 0.01, ""),
    ("percent", 0.01, ""),
    ("deg", 1.0, "deg"),
    ("°", 1.0, "deg"),
    ("rad", 1.0, "rad"),
    ("ohm", 1.0, "ohm"),
    ("ω", 1.0, "ohm"),
];

const BASE_UNITS: [&str; 12] = ["m", "g", "s", "N", "J", "W", "Pa", "Hz", "V", "A", "C", "L"];

const PREFIXES: [(&str, f64); 8] = [
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("c", 1e-2),
    ("m", 1e-3),
    ("µ", 1e-6),
    ("u", 1e-6),
    ("n", 1e-9),
];

/// A unit reduced to a scale factor over base units
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalUnit {
    pub factor: f64,
    /// e.g. `m/s`, `kg` becomes `g` with factor 1000
    pub base: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// Number as written, before any unit scaling
    pub raw: f64,
    /// Exact value when the number was written exactly (`3/4`, `0.25`)
    pub exact: Option<Rational>,
    /// Unit text as written, trimmed
    pub unit_text: String,
    /// `None` when no unit was given or it was not recognised
    pub unit: Option<CanonicalUnit>,
}

impl Quantity {
    /// Value after scaling by a recognised unit
    pub fn scaled(&self) -> f64 {
        match &self.unit {
            Some(unit) => self.raw * unit.factor,
            None => self.raw,
        }
    }

    pub fn has_unit(&self) -> bool {
        !self.unit_text.is_empty()
    }
}

/// Strip presentation noise models wrap answers in
pub fn clean_answer(text: &str) -> String {
    let mut text = text.trim().to_string();
    if let Some(caps) = BOXED.captures(&text) {
        text = caps[1].to_string();
    }
    let text = text
        .replace(['$', '`'], "")
        .replace("\\,", "")
        .replace(['−', '–'], "-")
        .replace(['×', '·'], "*")
        .replace("\\times", "*")
        .replace("\\cdot", "*")
        .replace("\\%", "%");
    let text = match text.rfind('=') {
        Some(pos) => text[pos + 1..].to_string(),
        None => text,
    };
    let text = text.trim().trim_end_matches('.').trim();
    let text = text
        .strip_prefix("answer:")
        .or_else(|| text.strip_prefix("Answer:"))
        .unwrap_or(text)
        .trim();
    let mut text = text.to_string();
    while THOUSANDS.is_match(&text) {
        text = THOUSANDS.replace_all(&text, "$1$2").to_string();
    }
    text
}

/// Read a leading number and optional unit
pub fn parse_quantity(text: &str) -> Option<Quantity> {
    let cleaned = clean_answer(text);
    let caps = NUMBER.captures(&cleaned)?;
    let mantissa = caps.name("mantissa")?.as_str();
    let mut raw: f64 = mantissa.parse().ok()?;
    let mut exact = Rational::parse(mantissa).ok();

    if let Some(denom) = caps.name("denom") {
        let d: f64 = denom.as_str().parse().ok()?;
        if d == 0.0 {
            return None;
        }
        raw /= d;
        exact = exact
            .zip(Rational::parse(denom.as_str()).ok())
            .and_then(|(n, d)| n.checked_div(&d).ok());
    }
    if let Some(exp) = caps.name("exp") {
        let e: i32 = exp.as_str().parse().ok()?;
        raw *= 10f64.powi(e);
        exact = exact.and_then(|v| {
            Rational::from_integer(10)
                .checked_pow(e)
                .and_then(|p| v.checked_mul(&p))
                .ok()
        });
    }
    if !raw.is_finite() {
        return None;
    }

    let unit_text = caps
        .name("rest")
        .map(|m| m.as_str().trim().trim_end_matches('.').to_string())
        .unwrap_or_default();
    let unit = if unit_text.is_empty() {
        None
    } else {
        canonical_unit(&unit_text)
    };

    Some(Quantity {
        raw,
        exact,
        unit_text,
        unit,
    })
}

/// Reduce `km/h`, `kN*m`, `m/s^2`, `%` to a factor over base units
pub fn canonical_unit(text: &str) -> Option<CanonicalUnit> {
    let text = text.trim();
    let (numerator, denominator) = match text.split_once('/') {
        Some((n, d)) => (n, Some(d)),
        None => (text, None),
    };

    let mut factor = 1.0;
    let mut base = String::new();
    for (part, sign) in [(Some(numerator), 1), (denominator, -1)] {
        let Some(part) = part else { continue };
        let tokens: Vec<&str> = part.split(['*', ' ']).filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return None;
        }
        if sign < 0 {
            base.push('/');
        }
        for (i, token) in tokens.iter().enumerate() {
            let (name, power) = match token.split_once('^') {
                Some((n, p)) => (n, p.trim_matches(['{', '}', '(', ')']).parse::<i32>().ok()?),
                None => (*token, 1),
            };
            let (token_factor, token_base) = unit_token(name)?;
            factor *= token_factor.powi(power * sign);
            if i > 0 {
                base.push('*');
            }
            base.push_str(&token_base);
            if power != 1 {
                base.push_str(&format!("^{}", power));
            }
        }
    }
    Some(CanonicalUnit { factor, base })
}

fn unit_token(name: &str) -> Option<(f64, String)> {
    let lower = name.to_lowercase();
    if let Some((_, factor, base)) = WHOLE_UNITS.iter().find(|(n, _, _)| *n == lower) {
        return Some((*factor, base.to_string()));
    }
    if BASE_UNITS.contains(&name) {
        return Some((1.0, name.to_string()));
    }
    for (prefix, scale) in PREFIXES {
        if let Some(base) = name.strip_prefix(prefix) {
            if BASE_UNITS.contains(&base) {
                return Some((scale, base.to_string()));
            }
        }
    }
    None
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    let diff = (a - b).abs();
    diff <= 1e-12 || diff <= tolerance * a.abs().max(b.abs())
}

/// `Some(result)` when both answers are numeric; `None` when either is not.
pub fn numeric_equivalent(expected: &str, actual: &str, tolerance: f64) -> Option<bool> {
    let expected = parse_quantity(expected)?;
    let actual = parse_quantity(actual)?;

    if let (Some(a), Some(b)) = (&expected.exact, &actual.exact) {
        if expected.unit_text == actual.unit_text && a == b {
            return Some(true);
        }
    }

    Some(match (&expected.unit, &actual.unit) {
        (Some(e), Some(a)) => e.base == a.base && close(expected.scaled(), actual.scaled(), tolerance),
        // One side unitless or unrecognised: accept a match on either reading
        _ => {
            close(expected.raw, actual.raw, tolerance) || close(expected.scaled(), actual.scaled(), tolerance)
        }
    })
}

/// Lowercased, whitespace-free, punctuation-trimmed form used as the last resort
pub fn normalize_text(text: &str) -> String {
    clean_answer(text)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '{' | '}'))
        .collect()
}

pub fn exact_equivalent(expected: &str, actual: &str) -> bool {
    let expected = normalize_text(expected);
    !expected.is_empty() && expected == normalize_text(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: &str, b: &str) -> Option<bool> {
        numeric_equivalent(a, b, DEFAULT_RELATIVE_TOLERANCE)
    }

    #[test]
    fn test_scientific_notation_forms() {
        assert_eq!(eq("2500", "2.5e3"), Some(true));
        assert_eq!(eq("2500", "2.5×10^3"), Some(true));
        assert_eq!(eq("2500", "2.5*10^{3}"), Some(true));
        assert_eq!(eq("2500", "2.6e3"), Some(false));
    }

    #[test]
    fn test_units_and_prefixes() {
        assert_eq!(eq("2.5 km", "2500 m"), Some(true));
        assert_eq!(eq("25 m/s", "90 km/h"), Some(true));
        assert_eq!(eq("25", "25.0 m/s"), Some(true));
        assert_eq!(eq("2 kg", "2000 g"), Some(true));
        assert_eq!(eq("5 m", "5 s"), Some(false));
    }

    #[test]
    fn test_fractions_percent_and_separators() {
        assert_eq!(eq("0.75", "3/4"), Some(true));
        assert_eq!(eq("1/3", "0.3333"), Some(true));
        assert_eq!(eq("0.4", "40%"), Some(true));
        assert_eq!(eq("1200 km", "1,200 km"), Some(true));
        assert_eq!(eq("25", "\\boxed{25}"), Some(true));
        assert_eq!(eq("25", "v = 25 m/s."), Some(true));
    }

    #[test]
    fn test_tolerance_and_non_numeric() {
        assert_eq!(eq("100", "100.05"), Some(true));
        assert_eq!(eq("100", "100.2"), Some(false));
        assert_eq!(eq("0", "0.0"), Some(true));
        assert_eq!(eq("north", "25"), None);
    }

    #[test]
    fn test_exact_text_fallback() {
        assert!(exact_equivalent("North-East", " north-east. "));
        assert!(!exact_equivalent("north", "south"));
        assert!(!exact_equivalent("", ""));
    }
}
