//! Cell text to typed JSON values.
//!
//! Two rule sets:
//!
//! - [`coerce`] - schema-less, used when rebuilding records from rows
//! - [`coerce_like`] - type-preserving, used when merging a row onto an
//!   existing record

use serde::Serialize;
use serde_json::{Number, Value};

/// Outcome of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    /// Blank cell: the key is omitted from the rebuilt record.
    Omitted,
    /// Typed value.
    Value(Value),
    /// The cell looked like a list but was not valid JSON; kept as text.
    Fallback(Value, String),
}

/// A non-fatal coercion problem, reported alongside the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercionWarning {
    pub column: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "column '{}' (value '{}'): {}",
            self.column, self.value, self.message
        )
    }
}

/// Coerce trimmed cell text.
///
/// Order: boolean (case-insensitive), integer, float, JSON array when the
/// text starts with `[`, then plain string.
pub fn coerce(raw: &str) -> Coercion {
    let text = raw.trim();
    if text.is_empty() {
        return Coercion::Omitted;
    }

    if text.eq_ignore_ascii_case("true") {
        return Coercion::Value(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Coercion::Value(Value::Bool(false));
    }

    if let Some(number) = parse_number(text) {
        return Coercion::Value(Value::Number(number));
    }

    if text.starts_with('[') {
        return match serde_json::from_str::<Value>(text) {
            Ok(list @ Value::Array(_)) => Coercion::Value(list),
            Ok(_) => Coercion::Fallback(
                Value::String(text.to_string()),
                "not a JSON list".to_string(),
            ),
            Err(e) => Coercion::Fallback(Value::String(text.to_string()), e.to_string()),
        };
    }

    Coercion::Value(Value::String(text.to_string()))
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    // Rust accepts "inf" and "NaN"; those are not JSON numbers.
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Loose boolean reading: `true/1/yes/y` and `false/0/no/n`.
pub fn parse_bool_loose(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Coerce cell text to the JSON type of `old`.
///
/// Empty text or a failed parse keeps `old`. A `null` old value takes the
/// schema-less rules.
pub fn coerce_like(old: &Value, raw: &str) -> Value {
    let text = raw.trim();
    if text.is_empty() {
        return old.clone();
    }

    match old {
        Value::Bool(_) => parse_bool_loose(text).map(Value::Bool),
        Value::Number(n) if n.is_f64() => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Value::Number(_) => parse_number(text)
            .filter(|n| !n.is_f64())
            .map(Value::Number),
        Value::Array(_) => serde_json::from_str::<Value>(text)
            .ok()
            .filter(Value::is_array),
        Value::Object(_) => serde_json::from_str::<Value>(text)
            .ok()
            .filter(Value::is_object),
        Value::String(_) => Some(Value::String(text.to_string())),
        Value::Null => match coerce(text) {
            Coercion::Value(v) | Coercion::Fallback(v, _) => Some(v),
            Coercion::Omitted => None,
        },
    }
    .unwrap_or_else(|| old.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(raw: &str) -> Value {
        match coerce(raw) {
            Coercion::Value(v) => v,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_booleans() {
        assert_eq!(value("true"), json!(true));
        assert_eq!(value("FALSE"), json!(false));
        assert_eq!(value(" True "), json!(true));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(value("42"), json!(42));
        assert_eq!(value("-7"), json!(-7));
        assert_eq!(value("18446744073709551615"), json!(18446744073709551615u64));
        assert_eq!(value("3.5"), json!(3.5));
    }

    #[test]
    fn test_non_finite_stays_text() {
        assert_eq!(value("inf"), json!("inf"));
        assert_eq!(value("NaN"), json!("NaN"));
    }

    #[test]
    fn test_blank_is_omitted() {
        assert_eq!(coerce(""), Coercion::Omitted);
        assert_eq!(coerce("   "), Coercion::Omitted);
    }

    #[test]
    fn test_strings() {
        assert_eq!(value("hello"), json!("hello"));
        assert_eq!(value("  padded "), json!("padded"));
    }

    #[test]
    fn test_lists() {
        assert_eq!(value(r#"["a", 1]"#), json!(["a", 1]));
        assert_eq!(value("[]"), json!([]));
    }

    #[test]
    fn test_malformed_list_falls_back() {
        match coerce("[a, b") {
            Coercion::Fallback(v, message) => {
                assert_eq!(v, json!("[a, b"));
                assert!(!message.is_empty());
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_loose_bool() {
        assert_eq!(parse_bool_loose("Yes"), Some(true));
        assert_eq!(parse_bool_loose("n"), Some(false));
        assert_eq!(parse_bool_loose("0"), Some(false));
        assert_eq!(parse_bool_loose("maybe"), None);
    }

    #[test]
    fn test_coerce_like_preserves_type() {
        assert_eq!(coerce_like(&json!(false), "yes"), json!(true));
        assert_eq!(coerce_like(&json!(5), "12"), json!(12));
        assert_eq!(coerce_like(&json!(1.5), "2"), json!(2.0));
        assert_eq!(coerce_like(&json!("x"), "123"), json!("123"));
        assert_eq!(coerce_like(&json!([1]), "[1, 2]"), json!([1, 2]));
        assert_eq!(coerce_like(&Value::Null, "7"), json!(7));
    }

    #[test]
    fn test_coerce_like_keeps_old_on_failure() {
        assert_eq!(coerce_like(&json!(5), "abc"), json!(5));
        assert_eq!(coerce_like(&json!(5), "2.5"), json!(5));
        assert_eq!(coerce_like(&json!(true), "perhaps"), json!(true));
        assert_eq!(coerce_like(&json!([1]), "{}"), json!([1]));
        assert_eq!(coerce_like(&json!("keep"), "  "), json!("keep"));
    }
}
