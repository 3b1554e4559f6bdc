//! Helpers for reading loosely-typed provider JSON.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Providers report success as `true`, `"success"`, `"successful"` or `"ok"`.
pub fn status_is_success(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(flag) => *flag,
        JsonValue::String(text) => matches!(
            text.trim().to_lowercase().as_str(),
            "success" | "successful" | "true" | "ok"
        ),
        JsonValue::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Reads a decimal from a JSON number or numeric string. Thousands
/// separators are tolerated in strings.
pub fn decimal_value(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64_retain)),
        JsonValue::String(text) => {
            let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                None
            } else {
                Decimal::from_str(&cleaned).ok()
            }
        }
        _ => None,
    }
}

/// First present, non-empty field among `keys`, rendered as a string.
pub fn text_field(object: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub fn decimal_field(object: &JsonValue, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(decimal_value))
}

/// Decimal as a JSON number: integers stay integral, fractions go through f64.
pub fn decimal_json(value: Decimal) -> JsonValue {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        if let Some(whole) = normalized.to_i64() {
            return JsonValue::from(whole);
        }
    }
    normalized
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(normalized.to_string()))
}

pub fn minor_to_major(minor: Decimal) -> Decimal {
    minor / Decimal::ONE_HUNDRED
}

/// Whole minor units for the wire, or `None` if the value cannot be represented.
pub fn major_to_minor(major: Decimal) -> Option<i64> {
    major
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| v.round())
        .and_then(|v| v.to_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn status_variants() {
        assert!(status_is_success(&json!(true)));
        assert!(status_is_success(&json!("Success")));
        assert!(!status_is_success(&json!("error")));
        assert!(!status_is_success(&json!(false)));
        assert!(!status_is_success(&JsonValue::Null));
    }

    #[test]
    fn decimals_from_numbers_and_strings() {
        assert_eq!(decimal_value(&json!(1000)), Some(dec!(1000)));
        assert_eq!(decimal_value(&json!("1,250.50")), Some(dec!(1250.50)));
        assert_eq!(decimal_value(&json!(99.5)), Some(dec!(99.5)));
        assert_eq!(decimal_value(&json!("n/a")), None);
    }

    #[test]
    fn minor_unit_conversion_is_numeric() {
        let major = minor_to_major(dec!(1000));
        assert_eq!(major, dec!(10));
        assert_eq!(major + dec!(50), dec!(60));
        assert_eq!(major_to_minor(dec!(25.75)), Some(2575));
    }

    #[test]
    fn decimals_render_as_json_numbers() {
        assert_eq!(decimal_json(dec!(500.00)), json!(500));
        assert_eq!(decimal_json(dec!(2500.50)), json!(2500.5));
    }
}
