//! Attribute validation.

mod rules;

use std::sync::Arc;

pub use rules::{
    Between, Boolean, Date, Email, In, IpAddress, Link, MaxLength, MinLength, Numeric, Positive,
    Regex, Required, Rule, Uuid4, WithMessage,
};

use crate::error::{OrmError, OrmResult, ValidationErrors};
use crate::value::Attributes;

/// Rules keyed by attribute, in declaration order.
pub type RuleSet = Vec<(String, Vec<Arc<dyn Rule>>)>;

/// Runs a [`RuleSet`] against a set of attributes.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use quarry_core::validation::{Email, Required, Rule, Validator};
///
/// let mut data = serde_json::Map::new();
/// data.insert("email".into(), "not-an-email".into());
///
/// let rules: Vec<Arc<dyn Rule>> = vec![Arc::new(Required), Arc::new(Email)];
/// let mut validator = Validator::new(data, vec![("email".to_string(), rules)]);
/// assert!(validator.fails());
/// assert_eq!(validator.errors().len(), 1);
/// ```
pub struct Validator {
    data: Attributes,
    rules: RuleSet,
    errors: ValidationErrors,
}

impl Validator {
    pub fn new(data: Attributes, rules: RuleSet) -> Self {
        Self {
            data,
            rules,
            errors: ValidationErrors::new(),
        }
    }

    /// Start from data alone and add rules with [`Validator::rule`].
    pub fn make(data: Attributes) -> Self {
        Self::new(data, Vec::new())
    }

    pub fn rule(mut self, attribute: impl Into<String>, rule: impl Rule + 'static) -> Self {
        let attribute = attribute.into();
        let rule: Arc<dyn Rule> = Arc::new(rule);
        match self.rules.iter_mut().find(|(name, _)| *name == attribute) {
            Some((_, rules)) => rules.push(rule),
            None => self.rules.push((attribute, vec![rule])),
        }
        self
    }

    /// Run every rule, returning whether all passed.
    pub fn validate(&mut self) -> bool {
        let mut errors = ValidationErrors::new();
        for (attribute, rules) in &self.rules {
            let value = self.data.get(attribute);
            for rule in rules {
                if let Err(message) = rule.validate(attribute, value) {
                    errors.add(attribute.clone(), message);
                }
            }
        }
        self.errors = errors;
        self.errors.is_empty()
    }

    pub fn fails(&mut self) -> bool {
        !self.validate()
    }

    /// Errors from the last run.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// The data, or the collected errors.
    pub fn validated(mut self) -> OrmResult<Attributes> {
        if self.fails() {
            return Err(OrmError::Validation(self.errors));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_collects_errors_per_attribute() {
        let mut validator = Validator::make(data(json!({"email": "", "age": "old"})))
            .rule("email", Required)
            .rule("email", Email)
            .rule("age", Numeric)
            .rule("age", Positive);

        assert!(validator.fails());
        let errors = validator.errors();
        assert_eq!(errors.get("email").unwrap(), ["The email field is required"]);
        assert_eq!(errors.get("age").unwrap().len(), 2);
    }

    #[test]
    fn test_validated_returns_data() {
        let validated = Validator::make(data(json!({"name": "Jane"})))
            .rule("name", Required)
            .rule("name", MaxLength(10))
            .validated()
            .unwrap();
        assert_eq!(validated["name"], json!("Jane"));
    }

    #[test]
    fn test_validated_surfaces_validation_error() {
        let err = Validator::make(Attributes::new())
            .rule("title", Required)
            .validated()
            .unwrap_err();
        match err {
            OrmError::Validation(errors) => assert!(errors.get("title").is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
