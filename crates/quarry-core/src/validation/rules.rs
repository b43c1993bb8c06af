use lazy_static::lazy_static;
use uuid::Uuid;
use validator::{ValidateEmail, ValidateUrl};

use crate::cast::parse_datetime;
use crate::value::{JsonValue, as_f64, display, is_blank, key_string};

/// A single validation rule.
///
/// Rules other than [`Required`] pass when the value is blank (absent, null or
/// an empty string), so optional attributes only need `Required` to become
/// mandatory.
pub trait Rule: Send + Sync {
    /// Whether a present, non-blank value is acceptable.
    fn passes(&self, value: &JsonValue) -> bool;

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} is invalid")
    }

    fn validate(&self, attribute: &str, value: Option<&JsonValue>) -> Result<(), String> {
        match value {
            Some(v) if !is_blank(Some(v)) => {
                if self.passes(v) {
                    Ok(())
                } else {
                    Err(self.default_message(attribute))
                }
            }
            _ => Ok(()),
        }
    }

    /// Replace the failure message.
    fn with_message(self, message: impl Into<String>) -> WithMessage<Self>
    where
        Self: Sized,
    {
        WithMessage {
            rule: self,
            message: message.into(),
        }
    }
}

/// A rule with a custom failure message.
pub struct WithMessage<R> {
    rule: R,
    message: String,
}

impl<R: Rule> Rule for WithMessage<R> {
    fn passes(&self, value: &JsonValue) -> bool {
        self.rule.passes(value)
    }

    fn default_message(&self, _attribute: &str) -> String {
        self.message.clone()
    }

    fn validate(&self, attribute: &str, value: Option<&JsonValue>) -> Result<(), String> {
        self.rule
            .validate(attribute, value)
            .map_err(|_| self.message.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Rule for Required {
    fn passes(&self, value: &JsonValue) -> bool {
        !is_blank(Some(value))
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} field is required")
    }

    fn validate(&self, attribute: &str, value: Option<&JsonValue>) -> Result<(), String> {
        if is_blank(value) {
            Err(self.default_message(attribute))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Email;

impl Rule for Email {
    fn passes(&self, value: &JsonValue) -> bool {
        // validator accepts dotless domains; require a TLD
        let text = display(value);
        text.validate_email()
            && text
                .rsplit_once('@')
                .is_some_and(|(_, domain)| domain.contains('.'))
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a valid email address")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinLength(pub usize);

impl Rule for MinLength {
    fn passes(&self, value: &JsonValue) -> bool {
        display(value).chars().count() >= self.0
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be at least {} characters", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

impl Rule for MaxLength {
    fn passes(&self, value: &JsonValue) -> bool {
        display(value).chars().count() <= self.0
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} may not be greater than {} characters", self.0)
    }
}

/// Matches the value against a pattern anchored at the start.
#[derive(Debug, Clone)]
pub struct Regex(regex::Regex);

impl Regex {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(Self)
    }
}

impl From<regex::Regex> for Regex {
    fn from(pattern: regex::Regex) -> Self {
        Self(pattern)
    }
}

impl Rule for Regex {
    fn passes(&self, value: &JsonValue) -> bool {
        let text = display(value);
        self.0.find(&text).is_some_and(|m| m.start() == 0)
    }
}

/// The value must be one of a fixed list.
#[derive(Debug, Clone)]
pub struct In(pub Vec<JsonValue>);

impl In {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl Rule for In {
    fn passes(&self, value: &JsonValue) -> bool {
        let key = key_string(value);
        self.0.iter().any(|v| v == value || key_string(v) == key)
    }

    fn default_message(&self, attribute: &str) -> String {
        let values: Vec<String> = self.0.iter().map(display).collect();
        format!("The {attribute} must be one of: {}", values.join(", "))
    }
}

/// ISO 8601 date or datetime text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Date;

impl Rule for Date {
    fn passes(&self, value: &JsonValue) -> bool {
        value.as_str().and_then(parse_datetime).is_some()
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a valid date")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Positive;

impl Rule for Positive {
    fn passes(&self, value: &JsonValue) -> bool {
        as_f64(value).is_some_and(|n| n > 0.0)
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a positive number")
    }
}

/// An http(s) URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Link;

impl Rule for Link {
    fn passes(&self, value: &JsonValue) -> bool {
        let text = display(value);
        (text.starts_with("http://") || text.starts_with("https://")) && text.validate_url()
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a valid URL")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Numeric;

impl Rule for Numeric {
    fn passes(&self, value: &JsonValue) -> bool {
        as_f64(value).is_some()
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a number")
    }
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy)]
pub struct Between {
    pub min: f64,
    pub max: f64,
}

impl Between {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Rule for Between {
    fn passes(&self, value: &JsonValue) -> bool {
        as_f64(value).is_some_and(|n| n >= self.min && n <= self.max)
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be between {} and {}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Boolean;

impl Rule for Boolean {
    fn passes(&self, value: &JsonValue) -> bool {
        match value {
            JsonValue::Bool(_) => true,
            other => matches!(
                display(other).to_lowercase().as_str(),
                "true" | "false" | "1" | "0"
            ),
        }
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a boolean")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uuid4;

impl Rule for Uuid4 {
    fn passes(&self, value: &JsonValue) -> bool {
        let text = display(value);
        // hyphenated form only
        text.len() == 36
            && Uuid::parse_str(&text).is_ok_and(|id| {
                id.get_version_num() == 4 && id.get_variant() == uuid::Variant::RFC4122
            })
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a valid UUID v4")
    }
}

lazy_static! {
    static ref DOTTED_QUAD: regex::Regex =
        regex::Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("valid IPv4 pattern");
}

/// Dotted-quad IPv4 address.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpAddress;

impl Rule for IpAddress {
    fn passes(&self, value: &JsonValue) -> bool {
        let text = display(value);
        DOTTED_QUAD.is_match(&text) && text.split('.').all(|octet| octet.parse::<u8>().is_ok())
    }

    fn default_message(&self, attribute: &str) -> String {
        format!("The {attribute} must be a valid IP address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(rule: &dyn Rule, value: JsonValue) -> Result<(), String> {
        rule.validate("field", Some(&value))
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(Required.validate("name", None).is_err());
        assert_eq!(
            Required.validate("name", Some(&json!("  "))).unwrap_err(),
            "The name field is required"
        );
        assert!(Required.validate("count", Some(&json!(0))).is_ok());
    }

    #[test]
    fn test_optional_rules_skip_blank_values() {
        assert!(Email.validate("email", None).is_ok());
        assert!(check(&Email, json!("")).is_ok());
        assert!(check(&MinLength(3), JsonValue::Null).is_ok());
    }

    #[test]
    fn test_email() {
        assert!(check(&Email, json!("jane@example.com")).is_ok());
        assert_eq!(
            check(&Email, json!("jane@localhost")).unwrap_err(),
            "The field must be a valid email address"
        );
    }

    #[test]
    fn test_lengths() {
        assert!(check(&MinLength(3), json!("ab")).is_err());
        assert!(check(&MaxLength(3), json!("abcd")).is_err());
        assert!(check(&MaxLength(3), json!("abc")).is_ok());
    }

    #[test]
    fn test_in_and_between() {
        let rule = In::new(["draft", "published"]);
        assert!(check(&rule, json!("draft")).is_ok());
        assert_eq!(
            check(&rule, json!("archived")).unwrap_err(),
            "The field must be one of: draft, published"
        );
        assert!(check(&Between::new(1.0, 10.0), json!("5")).is_ok());
        assert_eq!(
            check(&Between::new(1.0, 10.0), json!(11)).unwrap_err(),
            "The field must be between 1 and 10"
        );
    }

    #[test]
    fn test_format_rules() {
        assert!(check(&Date, json!("2023-01-01")).is_ok());
        assert!(check(&Date, json!("01/01/2023")).is_err());
        assert!(check(&Positive, json!(-1)).is_err());
        assert!(check(&Link, json!("https://example.com/docs")).is_ok());
        assert!(check(&Link, json!("ftp://example.com")).is_err());
        assert!(check(&Numeric, json!("12.5")).is_ok());
        assert!(check(&Boolean, json!("yes")).is_err());
        assert!(check(&Uuid4, json!("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_ok());
        assert!(check(&IpAddress, json!("192.168.1.1")).is_ok());
        assert!(check(&IpAddress, json!("256.1.1.1")).is_err());
    }

    #[test]
    fn test_regex_and_custom_message() {
        let rule = Regex::new(r"[A-Z]{3}\d+").unwrap().with_message("Bad SKU");
        assert!(check(&rule, json!("ABC123")).is_ok());
        assert_eq!(check(&rule, json!("x-ABC123")).unwrap_err(), "Bad SKU");
    }
}
