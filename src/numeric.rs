//! Numeric coercion for balance values.
//!
//! Upstream balance payloads mix plain numbers with display strings like
//! `"1.2k"` or `"3M"`. Everything funnels through one coercion so the rest
//! of the crate never cares which shape it got.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn magnitude_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]+(?:\.[0-9]+)?)([kKmMbB])?$").expect("magnitude pattern is valid")
    })
}

/// Coerce a JSON value into a float.
///
/// Numbers pass through; strings go through [`parse_magnitude`]; everything
/// else is not coercible.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_magnitude(text),
        _ => None,
    }
}

/// Parse a numeric string, accepting a thousand/million/billion suffix.
///
/// Internal spaces and underscore separators are dropped before parsing.
/// Strings the suffix grammar does not cover fall back to a plain float
/// parse; anything else yields `None`.
pub fn parse_magnitude(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '_')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(captures) = magnitude_regex().captures(&cleaned) {
        let base: f64 = captures[1].parse().ok()?;
        let multiplier = match captures.get(2).map(|m| m.as_str()) {
            Some("k") | Some("K") => 1e3,
            Some("m") | Some("M") => 1e6,
            Some("b") | Some("B") => 1e9,
            _ => 1.0,
        };
        return Some(base * multiplier);
    }

    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_numbers_pass_through() {
        assert_eq!(coerce_number(&json!(120)), Some(120.0));
        assert_eq!(coerce_number(&json!(0.5)), Some(0.5));
        assert_eq!(coerce_number(&json!(-3)), Some(-3.0));
    }

    #[test]
    fn suffixes_scale_by_magnitude() {
        assert_eq!(parse_magnitude("5k"), Some(5_000.0));
        assert_eq!(parse_magnitude("5K"), Some(5_000.0));
        assert_eq!(parse_magnitude("1.2m"), Some(1_200_000.0));
        assert_eq!(parse_magnitude("1.2M"), Some(1_200_000.0));
        assert_eq!(parse_magnitude("2b"), Some(2_000_000_000.0));
        assert_eq!(parse_magnitude("2B"), Some(2_000_000_000.0));
    }

    #[test]
    fn no_suffix_is_the_plain_value() {
        assert_eq!(parse_magnitude("42"), Some(42.0));
        assert_eq!(parse_magnitude("  17.5  "), Some(17.5));
    }

    #[test]
    fn separators_are_dropped() {
        assert_eq!(parse_magnitude("1_000"), Some(1_000.0));
        assert_eq!(parse_magnitude("1 200.5"), Some(1_200.5));
        assert_eq!(parse_magnitude("1_2k"), Some(12_000.0));
    }

    #[test]
    fn fallback_float_parse_handles_what_the_grammar_misses() {
        assert_eq!(parse_magnitude("-5"), Some(-5.0));
        assert_eq!(parse_magnitude("1e3"), Some(1_000.0));
    }

    #[test]
    fn garbage_is_not_coercible() {
        assert_eq!(parse_magnitude(""), None);
        assert_eq!(parse_magnitude("   "), None);
        assert_eq!(parse_magnitude("10kk"), None);
        assert_eq!(parse_magnitude("lots"), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(coerce_number(&json!({"amount": 3})), None);
    }
}
