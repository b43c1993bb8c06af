use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use quarry_core::{JsonValue, OrmResult};
use quarry_orm::Record;

use crate::fields::{Fields, to_value};
use crate::resource::Resource;

/// Resource whose output shape is a typed serde schema.
///
/// The record's public representation is deserialized into `T`, so missing
/// or mistyped fields fail with a validation error, and `T` is serialized
/// back as the payload.
pub struct SchemaResource<T> {
    _schema: PhantomData<fn() -> T>,
}

impl<T> SchemaResource<T> {
    pub fn new() -> Self {
        Self {
            _schema: PhantomData,
        }
    }
}

impl<T> Default for SchemaResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SchemaResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaResource")
            .field("schema", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Resource for SchemaResource<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_fields<'a>(&self, record: &'a Record) -> OrmResult<Fields<'a>> {
        let schema: T = record.to_schema()?;
        match to_value(&schema)? {
            JsonValue::Object(map) => Ok(Fields::new(record).merge(map)),
            other => Ok(Fields::new(record).field("data", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::user;
    use quarry_core::OrmError;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct PublicUser {
        id: i64,
        name: String,
        #[serde(default)]
        nickname: Option<String>,
    }

    #[test]
    fn test_schema_shapes_output() {
        let jane = user(json!({"id": 1, "name": "Jane", "email": "jane@example.com"}));
        let out = SchemaResource::<PublicUser>::new().to_json(&jane).unwrap();
        assert_eq!(out, json!({"id": 1, "name": "Jane", "nickname": null}));
    }

    #[test]
    fn test_schema_mismatch_is_validation_error() {
        let broken = user(json!({"id": "one"}));
        let err = SchemaResource::<PublicUser>::new().to_json(&broken).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }
}
