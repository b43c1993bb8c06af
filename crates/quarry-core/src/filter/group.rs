use serde::{Deserialize, Serialize};

use super::condition::FilterCondition;
use super::operator::Operator;
use crate::error::OrmError;
use crate::value::JsonValue;

/// How the members of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// A member of a filter group: a condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

impl From<FilterCondition> for FilterNode {
    fn from(condition: FilterCondition) -> Self {
        FilterNode::Condition(condition)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        FilterNode::Group(group)
    }
}

/// A list of conditions joined by one logical operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterGroup {
    pub operator: LogicalOperator,
    pub conditions: Vec<FilterNode>,
}

impl FilterGroup {
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            operator,
            conditions: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(LogicalOperator::And)
    }

    pub fn or() -> Self {
        Self::new(LogicalOperator::Or)
    }

    pub fn add(&mut self, node: impl Into<FilterNode>) -> &mut Self {
        self.conditions.push(node.into());
        self
    }

    pub fn add_condition(
        &mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<JsonValue>,
    ) -> Result<&mut Self, OrmError> {
        let condition = FilterCondition::new(field, operator, value)?;
        Ok(self.add(condition))
    }

    /// Append a nested group filled by `build`.
    pub fn add_group<F>(&mut self, operator: LogicalOperator, build: F) -> Result<&mut Self, OrmError>
    where
        F: FnOnce(&mut FilterGroup) -> Result<(), OrmError>,
    {
        let mut group = FilterGroup::new(operator);
        build(&mut group)?;
        Ok(self.add(group))
    }

    /// Chainable variant of `add_condition` for group callbacks.
    pub fn where_(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<JsonValue>,
    ) -> Result<Self, OrmError> {
        self.add_condition(field, operator, value)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Every condition in the tree, depth first.
    pub fn flatten(&self) -> Vec<&FilterCondition> {
        let mut out = Vec::new();
        for node in &self.conditions {
            match node {
                FilterNode::Condition(c) => out.push(c),
                FilterNode::Group(g) => out.extend(g.flatten()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_group_round_trips_through_json() {
        let mut root = FilterGroup::and();
        root.add_condition("age", Operator::GreaterThanOrEqual, 18).unwrap();
        root.add_group(LogicalOperator::Or, |roles| {
            roles.add_condition("role", Operator::Equal, "admin")?;
            roles.add_condition("role", Operator::Equal, "moderator")?;
            Ok(())
        })
        .unwrap();

        let value = serde_json::to_value(&root).unwrap();
        assert_eq!(value["operator"], json!("AND"));
        assert_eq!(value["conditions"][1]["operator"], json!("OR"));

        let parsed: FilterGroup = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.flatten().len(), 3);
    }

    #[test]
    fn test_failed_group_is_not_added() {
        let mut root = FilterGroup::and();
        let result = root.add_group(LogicalOperator::Or, |g| {
            g.add_condition("role", Operator::In, "admin")?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(root.is_empty());
    }
}
