use quarry_core::{JsonValue, OrmResult};
use quarry_orm::Record;

use crate::collection::ResourceCollection;
use crate::fields::Fields;

/// Public shape of a model in API payloads.
///
/// ```
/// use quarry_core::OrmResult;
/// use quarry_orm::Record;
/// use quarry_resources::{Fields, RecordResource, Resource};
///
/// struct UserResource;
///
/// impl Resource for UserResource {
///     fn to_fields<'a>(&self, user: &'a Record) -> OrmResult<Fields<'a>> {
///         let is_admin = user.attribute("is_admin")?.as_bool().unwrap_or(false);
///         Fields::new(user)
///             .attributes(["id", "name"])?
///             .when("email", is_admin, user.attribute("email")?)
///             .when_loaded("posts", |posts| posts.to_json())
///     }
/// }
/// ```
pub trait Resource: Send + Sync {
    fn to_fields<'a>(&self, record: &'a Record) -> OrmResult<Fields<'a>>;

    fn to_json(&self, record: &Record) -> OrmResult<JsonValue> {
        Ok(self.to_fields(record)?.into_json())
    }

    fn collection(&self, records: Vec<Record>) -> ResourceCollection<'_>
    where
        Self: Sized,
    {
        ResourceCollection::new(self, records)
    }
}

/// Renders a record as its visible attributes and loaded relations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordResource;

impl Resource for RecordResource {
    fn to_fields<'a>(&self, record: &'a Record) -> OrmResult<Fields<'a>> {
        Fields::new(record).visible()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use quarry_core::{Attributes, CastRegistry};
    use quarry_orm::{LoadedRelation, ModelDef, ModelMeta};
    use serde_json::json;

    fn meta(def: ModelDef) -> Arc<ModelMeta> {
        Arc::new(def.into_meta(&CastRegistry::with_defaults()).unwrap())
    }

    fn attrs(value: JsonValue) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    pub(crate) fn user(value: JsonValue) -> Record {
        let def = ModelDef::new("User")
            .cast("is_admin", "bool")
            .hidden(["password"]);
        Record::from_database(meta(def), attrs(value))
    }

    pub(crate) fn post(value: JsonValue) -> Record {
        Record::from_database(meta(ModelDef::new("Post")), attrs(value))
    }

    struct UserResource;

    impl Resource for UserResource {
        fn to_fields<'a>(&self, user: &'a Record) -> OrmResult<Fields<'a>> {
            let is_admin = user.attribute("is_admin")?.as_bool().unwrap_or(false);
            Fields::new(user)
                .attributes(["id", "name"])?
                .when("role", is_admin, "admin")
                .relation("posts", &RecordResource)
        }
    }

    #[test]
    fn test_custom_resource() {
        let mut jane = user(json!({"id": 1, "name": "Jane", "is_admin": 1, "password": "x"}));
        jane.set_relation("posts", LoadedRelation::Many(vec![post(json!({"id": 3}))]));

        assert_eq!(
            UserResource.to_json(&jane).unwrap(),
            json!({"id": 1, "name": "Jane", "role": "admin", "posts": [{"id": 3}]})
        );
    }

    #[test]
    fn test_record_resource_hides_attributes() {
        let jane = user(json!({"id": 1, "password": "secret", "is_admin": 0}));
        assert_eq!(
            RecordResource.to_json(&jane).unwrap(),
            json!({"id": 1, "is_admin": false})
        );
    }
}
