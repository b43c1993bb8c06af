//! ORM error types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures grouped by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure message for an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.0
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Messages recorded for one attribute.
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.0.get(attribute).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Every message, flattened in attribute order.
    pub fn messages(&self) -> Vec<String> {
        self.0.values().flatten().cloned().collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join(", "))
    }
}

/// Errors raised by the ORM layer.
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Model {model} not found for id {id}")]
    ModelNotFound { model: String, id: String },

    #[error("Model not registered: {0}")]
    UnknownModel(String),

    #[error("Relation '{relation}' is not loaded on model {model}")]
    RelationNotLoaded { relation: String, model: String },

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Polymorphic relation error: {0}")]
    MorphRelation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Attribute '{attribute}' is not mass assignable on model {model}")]
    MassAssignment { model: String, attribute: String },

    #[error("Attribute error: {0}")]
    Attribute(String),

    #[error("Cast '{cast}' failed: {message}")]
    Cast { cast: String, message: String },

    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Operation halted by '{event}' listener: {reason}")]
    Halted { event: String, reason: String },
}

impl OrmError {
    pub fn cast(cast: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cast {
            cast: cast.into(),
            message: message.into(),
        }
    }

    pub fn model_not_found(model: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::ModelNotFound {
            model: model.into(),
            id: id.to_string(),
        }
    }

    pub fn relation_not_loaded(relation: impl Into<String>, model: impl Into<String>) -> Self {
        Self::RelationNotLoaded {
            relation: relation.into(),
            model: model.into(),
        }
    }

    /// Stable machine-readable code, used by API error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::UnknownModel(_) => "UNKNOWN_MODEL",
            Self::RelationNotLoaded { .. } => "RELATION_NOT_LOADED",
            Self::InvalidRelation(_) => "INVALID_RELATION",
            Self::MorphRelation(_) => "MORPH_RELATION",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::MassAssignment { .. } => "MASS_ASSIGNMENT",
            Self::Attribute(_) => "ATTRIBUTE_ERROR",
            Self::Cast { .. } => "CAST_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Query(_) => "QUERY_ERROR",
            Self::Constraint(_) => "CONSTRAINT_VIOLATION",
            Self::Transaction(_) => "TRANSACTION_ERROR",
            Self::Deadlock(_) => "DEADLOCK",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Halted { .. } => "HALTED",
        }
    }
}

pub type OrmResult<T> = Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_group_by_attribute() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "The email field is required");
        errors.add("email", "The email must be a valid email address");
        errors.add("age", "The age must be a number");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert_eq!(errors.messages().first().map(String::as_str), Some("The age must be a number"));
    }

    #[test]
    fn test_model_not_found_message() {
        let err = OrmError::model_not_found("User", 42);
        assert_eq!(err.to_string(), "Model User not found for id 42");
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
    }
}
