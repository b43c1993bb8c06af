//! Attribute casts.
//!
//! A cast converts an attribute between its database representation and the
//! value the application reads. Models name their casts (`"json"`,
//! `"datetime"`, ...) and the [`CastRegistry`] resolves the names.

mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use builtin::{
    BoolCast, DateCast, DateTimeCast, FloatCast, IntCast, JsonCast, StrCast, UuidCast,
    parse_datetime,
};

use crate::error::{OrmError, OrmResult};
use crate::value::JsonValue;

/// Column type hint used when binding a cast value into a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Uuid,
    Json,
}

/// Two-way conversion for a single attribute.
pub trait Cast: Send + Sync {
    /// Database value → application value.
    fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue>;

    /// Application value → database value.
    fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue>;

    fn db_type(&self) -> Option<DbType> {
        None
    }
}

/// Named casts available to model definitions.
#[derive(Clone, Default)]
pub struct CastRegistry {
    casts: HashMap<String, Arc<dyn Cast>>,
}

impl fmt::Debug for CastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.casts.keys().collect();
        names.sort();
        f.debug_struct("CastRegistry").field("casts", &names).finish()
    }
}

impl CastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in casts.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("json", JsonCast);
        registry.register("datetime", DateTimeCast);
        registry.register("date", DateCast);
        registry.register("bool", BoolCast);
        registry.register("int", IntCast);
        registry.register("float", FloatCast);
        registry.register("str", StrCast);
        registry.register("uuid", UuidCast);
        registry
    }

    /// Add or replace a cast.
    pub fn register(&mut self, name: impl Into<String>, cast: impl Cast + 'static) -> &mut Self {
        self.casts.insert(name.into(), Arc::new(cast));
        self
    }

    pub fn register_arc(&mut self, name: impl Into<String>, cast: Arc<dyn Cast>) -> &mut Self {
        self.casts.insert(name.into(), cast);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.casts.contains_key(name)
    }

    pub fn get(&self, name: &str) -> OrmResult<Arc<dyn Cast>> {
        self.casts
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::cast(name, "cast not found"))
    }

    pub fn cast_to_model(&self, name: &str, value: &JsonValue) -> OrmResult<JsonValue> {
        self.get(name)?.to_model(value)
    }

    pub fn cast_to_database(&self, name: &str, value: &JsonValue) -> OrmResult<JsonValue> {
        self.get(name)?.to_database(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Cast for Upper {
        fn to_model(&self, value: &JsonValue) -> OrmResult<JsonValue> {
            Ok(value
                .as_str()
                .map(|s| JsonValue::from(s.to_uppercase()))
                .unwrap_or(JsonValue::Null))
        }

        fn to_database(&self, value: &JsonValue) -> OrmResult<JsonValue> {
            Ok(value
                .as_str()
                .map(|s| JsonValue::from(s.to_lowercase()))
                .unwrap_or(JsonValue::Null))
        }
    }

    #[test]
    fn test_unknown_cast_is_an_error() {
        let registry = CastRegistry::with_defaults();
        let err = registry.cast_to_model("money", &json!(1)).unwrap_err();
        assert!(matches!(err, OrmError::Cast { .. }));
    }

    #[test]
    fn test_custom_cast_registration() {
        let mut registry = CastRegistry::with_defaults();
        registry.register("upper", Upper);

        assert_eq!(registry.cast_to_model("upper", &json!("abc")).unwrap(), json!("ABC"));
        assert_eq!(registry.cast_to_database("upper", &json!("ABC")).unwrap(), json!("abc"));
        assert!(registry.contains("json"));
    }
}
