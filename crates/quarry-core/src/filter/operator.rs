use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrmError;

/// Comparison operators supported by filters and where clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "IS NULL")]
    Null,
    #[serde(rename = "IS NOT NULL")]
    NotNull,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "NOT BETWEEN")]
    NotBetween,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThan,
        Operator::LessThanOrEqual,
        Operator::Like,
        Operator::ILike,
        Operator::In,
        Operator::NotIn,
        Operator::Null,
        Operator::NotNull,
        Operator::Between,
        Operator::NotBetween,
    ];

    /// SQL spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Null => "IS NULL",
            Operator::NotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
        }
    }

    /// Whether `operator` is a recognised spelling.
    pub fn validate(operator: &str) -> bool {
        operator.parse::<Operator>().is_ok()
    }

    /// Everything except the null checks needs a value.
    pub fn requires_value(&self) -> bool {
        !matches!(self, Operator::Null | Operator::NotNull)
    }

    pub fn requires_array(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Between | Operator::NotBetween
        )
    }

    pub fn is_pattern_match(&self) -> bool {
        matches!(self, Operator::Like | Operator::ILike)
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        if normalized == "<>" {
            return Ok(Operator::NotEqual);
        }
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| OrmError::InvalidFilter(format!("Invalid operator: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_and_space_insensitive() {
        assert_eq!("not  in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("ilike".parse::<Operator>().unwrap(), Operator::ILike);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::NotEqual);
        assert!(!Operator::validate("INVALID"));
    }

    #[test]
    fn test_operator_traits() {
        assert!(!Operator::Null.requires_value());
        assert!(Operator::Equal.requires_value());
        assert!(Operator::Between.requires_array());
        assert!(!Operator::Equal.requires_array());
        assert!(Operator::ILike.is_pattern_match());
    }

    #[test]
    fn test_serde_uses_sql_spelling() {
        let json = serde_json::to_string(&Operator::NotNull).unwrap();
        assert_eq!(json, "\"IS NOT NULL\"");
        let op: Operator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, Operator::GreaterThanOrEqual);
    }
}
