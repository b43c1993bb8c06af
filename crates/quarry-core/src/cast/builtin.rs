use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use super::{Cast, DbType};
use crate::error::{OrmError, OrmResult};
use crate::value::JsonValue;

/// Structured JSON. Null and unreadable text read as an empty object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCast;

impl Cast for JsonCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(match value {
            JsonValue::Null => JsonValue::Object(Default::default()),
            JsonValue::String(text) => serde_json::from_str(text)
                .unwrap_or_else(|_| JsonValue::Object(Default::default())),
            other => other.clone(),
        })
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(match value {
            JsonValue::Null => JsonValue::Null,
            JsonValue::String(text) => serde_json::from_str(text)
                .unwrap_or_else(|_| JsonValue::Object(Default::default())),
            other => other.clone(),
        })
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Json)
    }
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn datetime_of(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(text) => parse_datetime(text),
        JsonValue::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// UTC timestamps, normalized to RFC 3339. Unparsable input becomes null.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeCast;

impl Cast for DateTimeCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(datetime_of(value)
            .map(|dt| JsonValue::from(dt.to_rfc3339()))
            .unwrap_or(JsonValue::Null))
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        self.to_model(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::DateTime)
    }
}

/// Calendar dates as `YYYY-MM-DD`. Unparsable input becomes null.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCast;

impl Cast for DateCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(datetime_of(value)
            .map(|dt| JsonValue::from(dt.date_naive().format("%Y-%m-%d").to_string()))
            .unwrap_or(JsonValue::Null))
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        self.to_model(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Date)
    }
}

/// Truthiness. Null stays null so nullable flags survive a round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCast;

impl BoolCast {
    fn truthy(value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::Null => JsonValue::Null,
            JsonValue::Bool(b) => JsonValue::Bool(*b),
            JsonValue::Number(n) => JsonValue::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            JsonValue::String(s) => {
                let lowered = s.trim().to_lowercase();
                JsonValue::Bool(!matches!(
                    lowered.as_str(),
                    "" | "0" | "false" | "no" | "off"
                ))
            }
            JsonValue::Array(items) => JsonValue::Bool(!items.is_empty()),
            JsonValue::Object(map) => JsonValue::Bool(!map.is_empty()),
        }
    }
}

impl Cast for BoolCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(Self::truthy(value))
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(Self::truthy(value))
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Boolean)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntCast;

impl IntCast {
    fn convert(value: &JsonValue) -> OrmResult<JsonValue> {
        match value {
            JsonValue::Null => Ok(JsonValue::Null),
            JsonValue::Bool(b) => Ok(JsonValue::from(i64::from(*b))),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(JsonValue::from(i)),
                // floats truncate toward zero
                None => n
                    .as_f64()
                    .map(|f| JsonValue::from(f.trunc() as i64))
                    .ok_or_else(|| OrmError::cast("int", format!("cannot convert {n}"))),
            },
            JsonValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| OrmError::cast("int", format!("invalid integer: {s:?}"))),
            other => Err(OrmError::cast("int", format!("cannot convert {other}"))),
        }
    }
}

impl Cast for IntCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Self::convert(value)
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Self::convert(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Integer)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatCast;

impl FloatCast {
    fn convert(value: &JsonValue) -> OrmResult<JsonValue> {
        let number = match value {
            JsonValue::Null => return Ok(JsonValue::Null),
            JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|f| f.is_finite())
            .map(JsonValue::from)
            .ok_or_else(|| OrmError::cast("float", format!("cannot convert {value}")))
    }
}

impl Cast for FloatCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Self::convert(value)
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Self::convert(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Float)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrCast;

impl Cast for StrCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        Ok(match value {
            JsonValue::Null => JsonValue::Null,
            JsonValue::String(s) => JsonValue::String(s.clone()),
            other => JsonValue::String(other.to_string()),
        })
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        self.to_model(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Text)
    }
}

/// Hyphenated lowercase UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCast;

impl Cast for UuidCast {
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        match value {
            JsonValue::Null => Ok(JsonValue::Null),
            JsonValue::String(s) => Uuid::parse_str(s.trim())
                .map(|id| JsonValue::from(id.to_string()))
                .map_err(|e| OrmError::cast("uuid", e.to_string())),
            other => Err(OrmError::cast("uuid", format!("cannot convert {other}"))),
        }
    }

    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
        self.to_model(value)
    }

    fn db_type(&self) -> Option<DbType> {
        Some(DbType::Uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_cast_reads_text_and_defaults_to_empty_object() {
        assert_eq!(JsonCast.to_model(&json!("{\"theme\":\"dark\"}")).unwrap(), json!({"theme": "dark"}));
        assert_eq!(JsonCast.to_model(&JsonValue::Null).unwrap(), json!({}));
        assert_eq!(JsonCast.to_model(&json!("not json")).unwrap(), json!({}));
        assert_eq!(JsonCast.to_database(&json!("{oops")).unwrap(), json!({}));
    }

    #[test]
    fn test_datetime_cast_normalizes() {
        let value = DateTimeCast.to_model(&json!("2023-01-01 12:00:00")).unwrap();
        assert_eq!(value, json!("2023-01-01T12:00:00+00:00"));
        assert_eq!(DateTimeCast.to_model(&json!("yesterday")).unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_date_cast_drops_time() {
        let value = DateCast.to_model(&json!("2023-05-04T10:11:12Z")).unwrap();
        assert_eq!(value, json!("2023-05-04"));
    }

    #[test]
    fn test_bool_cast() {
        assert_eq!(BoolCast.to_model(&json!(1)).unwrap(), json!(true));
        assert_eq!(BoolCast.to_model(&json!("false")).unwrap(), json!(false));
        assert_eq!(BoolCast.to_model(&json!("yes")).unwrap(), json!(true));
        assert_eq!(BoolCast.to_model(&JsonValue::Null).unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(IntCast.to_model(&json!("42")).unwrap(), json!(42));
        assert_eq!(IntCast.to_model(&json!(3.9)).unwrap(), json!(3));
        assert!(IntCast.to_model(&json!("4.5")).is_err());
        assert_eq!(FloatCast.to_model(&json!("19.99")).unwrap(), json!(19.99));
        assert!(FloatCast.to_model(&json!("abc")).is_err());
        assert_eq!(StrCast.to_model(&json!(7)).unwrap(), json!("7"));
    }

    #[test]
    fn test_uuid_cast() {
        let value = UuidCast
            .to_model(&json!("67E55044-10B1-426F-9247-BB680E5FE0C8"))
            .unwrap();
        assert_eq!(value, json!("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(UuidCast.to_model(&json!("nope")).is_err());
    }
}
