//! Serializable filter trees.
//!
//! A [`Filter`] is a database-independent description of a where clause. It
//! can be built fluently, shipped as JSON (for example from an API query
//! string) and applied to a query builder.

mod condition;
mod group;
mod operator;

pub use condition::FilterCondition;
pub use group::{FilterGroup, FilterNode, LogicalOperator};
pub use operator::Operator;

use serde::{Deserialize, Serialize};

use crate::error::OrmError;
use crate::value::JsonValue;

/// Fluent filter builder with an AND root group.
///
/// Every call appends one node to the root, so nodes are always ANDed.
/// Alternatives go inside one OR group.
///
/// # Example
/// ```
/// use quarry_core::filter::{Filter, Operator};
///
/// // age >= 18 AND status IN ('pending', 'active') AND (role = 'admin' OR role = 'editor')
/// let filter = Filter::new()
///     .where_("age", Operator::GreaterThanOrEqual, 18)?
///     .where_in("status", vec!["pending".into(), "active".into()])?
///     .or_where_group(|g| {
///         g.where_("role", Operator::Equal, "admin")?
///             .where_("role", Operator::Equal, "editor")
///     })?;
/// assert_eq!(filter.root().len(), 3);
/// # Ok::<(), quarry_core::OrmError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    root: FilterGroup,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &FilterGroup {
        &self.root
    }

    pub fn into_root(self) -> FilterGroup {
        self.root
    }

    pub fn where_(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        self.root.add_condition(field, operator, value)?;
        Ok(self)
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Result<Self, OrmError> {
        self.where_(field, Operator::Equal, value)
    }

    /// Add a single-condition OR group.
    ///
    /// The group is ANDed onto the root like any other node, so
    /// `where_(a).or_where(b)` means `a AND (b)`. This differs from
    /// `QueryBuilder::or_where`; use [`Filter::or_where_group`] to express
    /// alternatives.
    pub fn or_where(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        let mut group = FilterGroup::or();
        group.add_condition(field, operator, value)?;
        self.root.add(group);
        Ok(self)
    }

    /// Add an OR group filled by `build`.
    pub fn or_where_group<F>(mut self, build: F) -> Result<Self, OrmError>
    where
        F: FnOnce(FilterGroup) -> Result<FilterGroup, OrmError>,
    {
        let group = build(FilterGroup::or())?;
        self.root.add(group);
        Ok(self)
    }

    /// Add an AND group filled by `build`.
    pub fn group<F>(mut self, build: F) -> Result<Self, OrmError>
    where
        F: FnOnce(FilterGroup) -> Result<FilterGroup, OrmError>,
    {
        let group = build(FilterGroup::and())?;
        self.root.add(group);
        Ok(self)
    }

    pub fn where_in(self, field: impl Into<String>, values: Vec<JsonValue>) -> Result<Self, OrmError> {
        self.where_(field, Operator::In, values)
    }

    pub fn where_not_in(self, field: impl Into<String>, values: Vec<JsonValue>) -> Result<Self, OrmError> {
        self.where_(field, Operator::NotIn, values)
    }

    pub fn where_null(self, field: impl Into<String>) -> Result<Self, OrmError> {
        self.where_(field, Operator::Null, JsonValue::Null)
    }

    pub fn where_not_null(self, field: impl Into<String>) -> Result<Self, OrmError> {
        self.where_(field, Operator::NotNull, JsonValue::Null)
    }

    pub fn where_between(
        self,
        field: impl Into<String>,
        low: impl Into<JsonValue>,
        high: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        self.where_(field, Operator::Between, vec![low.into(), high.into()])
    }

    pub fn where_not_between(
        self,
        field: impl Into<String>,
        low: impl Into<JsonValue>,
        high: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        self.where_(field, Operator::NotBetween, vec![low.into(), high.into()])
    }

    pub fn where_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Result<Self, OrmError> {
        self.where_(field, Operator::Like, pattern.into())
    }

    /// Case-insensitive LIKE.
    pub fn where_ilike(self, field: impl Into<String>, pattern: impl Into<String>) -> Result<Self, OrmError> {
        self.where_(field, Operator::ILike, pattern.into())
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&self.root).unwrap_or(JsonValue::Null)
    }

    pub fn from_json(value: JsonValue) -> Result<Self, OrmError> {
        let root = serde_json::from_value(value)
            .map_err(|e| OrmError::InvalidFilter(e.to_string()))?;
        Ok(Self { root })
    }
}

impl From<FilterGroup> for Filter {
    fn from(root: FilterGroup) -> Self {
        Self { root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_or_group_callback() {
        let filter = Filter::new()
            .where_eq("status", "active")
            .unwrap()
            .or_where_group(|g| {
                g.where_("role", Operator::Equal, "admin")?
                    .where_("is_super", Operator::Equal, true)
            })
            .unwrap();

        let json = filter.to_json();
        assert_eq!(json["conditions"][1]["operator"], json!("OR"));
        assert_eq!(json["conditions"][1]["conditions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_from_json_rejects_bad_operator() {
        let err = Filter::from_json(json!({
            "operator": "AND",
            "conditions": [{"field": "age", "operator": "between", "value": 3}]
        }))
        .unwrap_err();
        assert!(matches!(err, OrmError::InvalidFilter(_)));
    }

    #[test]
    fn test_where_between_builds_bounds() {
        let filter = Filter::new().where_between("created_at", "2023-01-01", "2023-12-31").unwrap();
        let cond = filter.root().flatten()[0];
        assert_eq!(cond.operator(), Operator::Between);
        assert_eq!(cond.values().len(), 2);
    }
}
