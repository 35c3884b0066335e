//! Numeric sanitization applied once at the payload boundary.
//!
//! Descends a `serde_json::Value` tree and replaces NaN/Inf (which
//! `serde_json` cannot represent but which can sneak in via `f64::to_string`
//! round-trips or manually constructed numbers) with `null`. Also exposed as
//! standalone helpers so analyzers can sanitize a single value inline instead
//! of paying for a full tree walk per row.

use serde_json::Value;

/// Recursively sanitize a JSON value: NaN/Inf become null, everything else
/// passes through unchanged.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, sanitize_value(v))).collect())
        },
        other => other,
    }
}

/// Convert a possibly-NaN/Inf float to a JSON-safe `f64`, or `None`.
pub fn sanitize_f64(value: f64) -> Option<f64> {
    if value.is_finite() { Some(value) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_and_inf_become_null() {
        let v = json!({"a": f64::NAN, "b": [f64::INFINITY, 1.0, "x"]});
        let sanitized = sanitize_value(v);
        assert_eq!(sanitized, json!({"a": null, "b": [null, 1.0, "x"]}));
    }

    #[test]
    fn sanitize_f64_rejects_non_finite() {
        assert_eq!(sanitize_f64(f64::NAN), None);
        assert_eq!(sanitize_f64(f64::INFINITY), None);
        assert_eq!(sanitize_f64(1.5), Some(1.5));
    }
}
