//! Attribute value helpers.

pub use serde_json::Value as JsonValue;

/// Column name to value, in the database representation.
pub type Attributes = serde_json::Map<String, JsonValue>;

/// Normalize a key value so that `1`, `1.0` and `"1"` match when pairing
/// parents with eager-loaded children.
pub fn key_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Some(i.to_string()),
            (_, Some(u), _) => Some(u.to_string()),
            (_, _, Some(f)) if f.fract() == 0.0 => Some((f as i64).to_string()),
            _ => Some(n.to_string()),
        },
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Read a number that may have been serialized as text (decimal columns).
pub fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Absent, null or an empty string.
pub fn is_blank(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a value the way it appears in messages and URLs.
pub fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_string_unifies_numeric_forms() {
        assert_eq!(key_string(&json!(7)), Some("7".to_string()));
        assert_eq!(key_string(&json!(7.0)), Some("7".to_string()));
        assert_eq!(key_string(&json!("7")), Some("7".to_string()));
        assert_eq!(key_string(&JsonValue::Null), None);
    }

    #[test]
    fn test_as_f64_reads_decimal_text() {
        assert_eq!(as_f64(&json!("12.50")), Some(12.5));
        assert_eq!(as_f64(&json!(3)), Some(3.0));
        assert_eq!(as_f64(&json!(true)), None);
    }
}
