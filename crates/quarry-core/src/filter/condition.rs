use serde::{Deserialize, Serialize};

use super::operator::Operator;
use crate::error::OrmError;
use crate::value::JsonValue;

/// A single `field <operator> value` predicate.
///
/// Construction validates the operator/value pairing, so a condition that
/// exists is always renderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct FilterCondition {
    field: String,
    operator: Operator,
    value: JsonValue,
}

#[derive(Deserialize)]
struct RawCondition {
    field: String,
    operator: String,
    #[serde(default)]
    value: JsonValue,
}

impl TryFrom<RawCondition> for FilterCondition {
    type Error = OrmError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let operator = raw.operator.parse()?;
        FilterCondition::new(raw.field, operator, raw.value)
    }
}

impl FilterCondition {
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        let field = field.into();
        let value = value.into();

        if field.trim().is_empty() {
            return Err(OrmError::InvalidFilter("Field name cannot be empty".into()));
        }

        if operator.requires_value() && value.is_null() {
            return Err(OrmError::InvalidFilter(format!(
                "Operator {operator} requires a value"
            )));
        }

        if operator.requires_array() {
            let Some(items) = value.as_array() else {
                return Err(OrmError::InvalidFilter(format!(
                    "Operator {operator} requires an array of values"
                )));
            };
            if operator.is_range() && items.len() != 2 {
                return Err(OrmError::InvalidFilter(format!(
                    "Operator {operator} requires exactly 2 values"
                )));
            }
        }

        // IS NULL / IS NOT NULL ignore any value they were given
        let value = if operator.requires_value() {
            value
        } else {
            JsonValue::Null
        };

        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Short form: `field = value`.
    pub fn equals(field: impl Into<String>, value: impl Into<JsonValue>) -> Result<Self, OrmError> {
        Self::new(field, Operator::Equal, value)
    }

    /// Parse the operator from its SQL spelling.
    pub fn parse(
        field: impl Into<String>,
        operator: &str,
        value: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        Self::new(field, operator.parse()?, value)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }

    /// Range bounds for BETWEEN / NOT BETWEEN.
    pub fn bounds(&self) -> Option<(&JsonValue, &JsonValue)> {
        match self.value.as_array().map(Vec::as_slice) {
            Some([low, high]) => Some((low, high)),
            _ => None,
        }
    }

    /// Values for IN / NOT IN.
    pub fn values(&self) -> &[JsonValue] {
        self.value.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_missing_value() {
        let err = FilterCondition::new("age", Operator::GreaterThan, JsonValue::Null).unwrap_err();
        assert!(err.to_string().contains("requires a value"));
    }

    #[test]
    fn test_rejects_scalar_for_in() {
        assert!(FilterCondition::new("status", Operator::In, "active").is_err());
        assert!(FilterCondition::new("status", Operator::In, json!(["active"])).is_ok());
    }

    #[test]
    fn test_between_needs_two_bounds() {
        assert!(FilterCondition::new("age", Operator::Between, json!([1, 2, 3])).is_err());
        let cond = FilterCondition::new("age", Operator::Between, json!([18, 65])).unwrap();
        assert_eq!(cond.bounds(), Some((&json!(18), &json!(65))));
    }

    #[test]
    fn test_null_check_drops_value() {
        let cond = FilterCondition::new("deleted_at", Operator::Null, "ignored").unwrap();
        assert!(cond.value().is_null());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: FilterCondition =
            serde_json::from_value(json!({"field": "age", "operator": ">=", "value": 18})).unwrap();
        assert_eq!(ok.operator(), Operator::GreaterThanOrEqual);

        let bad = serde_json::from_value::<FilterCondition>(
            json!({"field": "age", "operator": "~~", "value": 18}),
        );
        assert!(bad.is_err());
    }
}
