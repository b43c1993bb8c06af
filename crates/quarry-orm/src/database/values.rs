//! Conversions between attribute values and sea-query values.

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::{Keyword, SimpleExpr, Value};
use sea_orm::{FromQueryResult, QueryResult};
use uuid::Uuid;

use quarry_core::cast::parse_datetime;
use quarry_core::{Attributes, DbType, JsonValue, OrmError, OrmResult};

fn null_of(hint: Option<DbType>) -> Value {
    match hint {
        Some(DbType::Integer) => Value::BigInt(None),
        Some(DbType::Float) => Value::Double(None),
        Some(DbType::Boolean) => Value::Bool(None),
        Some(DbType::Json) => Value::Json(None),
        _ => Value::String(None),
    }
}

/// Bind a JSON attribute as a typed statement value.
///
/// The hint comes from the attribute's cast; without one the JSON type
/// decides.
pub fn to_db_value(value: &JsonValue, hint: Option<DbType>) -> Value {
    match (value, hint) {
        (JsonValue::Null, hint) => null_of(hint),
        (JsonValue::String(text), Some(DbType::DateTime)) => match parse_datetime(text) {
            Some(dt) => dt.into(),
            None => text.clone().into(),
        },
        (JsonValue::String(text), Some(DbType::Date)) => {
            match NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d") {
                Ok(date) => date.into(),
                Err(_) => text.clone().into(),
            }
        }
        (JsonValue::String(text), Some(DbType::Uuid)) => match Uuid::parse_str(text) {
            Ok(id) => id.into(),
            Err(_) => text.clone().into(),
        },
        (other, Some(DbType::Json)) => other.clone().into(),
        (JsonValue::Bool(b), _) => (*b).into(),
        (JsonValue::Number(n), Some(DbType::Float)) => n.as_f64().unwrap_or_default().into(),
        (JsonValue::Number(n), _) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.into(),
            (None, Some(u)) => u.into(),
            _ => n.as_f64().unwrap_or_default().into(),
        },
        (JsonValue::String(text), _) => text.clone().into(),
        (composite, _) => composite.clone().into(),
    }
}

/// Expression for a bound value; null becomes the `NULL` keyword.
pub fn value_expr(value: &JsonValue, hint: Option<DbType>) -> SimpleExpr {
    match value {
        JsonValue::Null => SimpleExpr::Keyword(Keyword::Null),
        other => SimpleExpr::Value(to_db_value(other, hint)),
    }
}

/// Current UTC time as stored in timestamp attributes.
pub fn now() -> JsonValue {
    JsonValue::from(Utc::now().to_rfc3339())
}

/// Read a result row into attributes.
pub fn row_to_attributes(row: &QueryResult) -> OrmResult<Attributes> {
    match JsonValue::from_query_result(row, "") {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(OrmError::Query(format!("Unexpected row shape: {other}"))),
        Err(e) => Err(OrmError::Query(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hints_select_value_types() {
        assert!(matches!(
            to_db_value(&json!("2023-01-01T00:00:00Z"), Some(DbType::DateTime)),
            Value::ChronoDateTimeUtc(Some(_))
        ));
        assert!(matches!(
            to_db_value(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8"), Some(DbType::Uuid)),
            Value::Uuid(Some(_))
        ));
        assert!(matches!(to_db_value(&json!({"a": 1}), None), Value::Json(Some(_))));
        assert!(matches!(to_db_value(&json!(3), None), Value::BigInt(Some(3))));
        assert!(matches!(to_db_value(&json!(3), Some(DbType::Float)), Value::Double(Some(_))));
        assert!(matches!(to_db_value(&JsonValue::Null, Some(DbType::Integer)), Value::BigInt(None)));
    }

    #[test]
    fn test_null_expr_is_keyword() {
        assert!(matches!(value_expr(&JsonValue::Null, None), SimpleExpr::Keyword(Keyword::Null)));
    }
}
