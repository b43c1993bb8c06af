use quarry_core::{Attributes, JsonValue, OrmError, OrmResult};
use quarry_orm::{LoadedRelation, Record};

use crate::resource::Resource;

/// Aggregate over the records of a loaded relation, used for relation meta.
pub type RelationMeta<'m> = (&'m str, &'m dyn Fn(&[Record]) -> JsonValue);

/// Output fields of one record, built up by a [`Resource`].
///
/// Conditional helpers leave the key out entirely when their condition
/// does not hold.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    record: &'a Record,
    values: Attributes,
}

impl<'a> Fields<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self {
            record,
            values: Attributes::new(),
        }
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Copy an attribute of the record, with its cast applied.
    pub fn attribute(self, key: &str) -> OrmResult<Self> {
        let value = self.record.attribute(key)?;
        Ok(self.field(key, value))
    }

    pub fn attributes<I, S>(mut self, keys: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self = self.attribute(key.as_ref())?;
        }
        Ok(self)
    }

    /// Every visible attribute and loaded relation of the record.
    pub fn visible(self) -> OrmResult<Self> {
        match self.record.to_json()? {
            JsonValue::Object(map) => Ok(self.merge(map)),
            _ => Ok(self),
        }
    }

    pub fn when(self, key: impl Into<String>, condition: bool, value: impl Into<JsonValue>) -> Self {
        if condition { self.field(key, value) } else { self }
    }

    /// Like [`Fields::when`], but writes `default` when the condition fails.
    pub fn when_or(
        self,
        key: impl Into<String>,
        condition: bool,
        value: impl Into<JsonValue>,
        default: impl Into<JsonValue>,
    ) -> Self {
        if condition {
            self.field(key, value)
        } else {
            self.field(key, default)
        }
    }

    /// Include a relation under its own name only if it was loaded.
    pub fn when_loaded<F>(self, relation: &str, f: F) -> OrmResult<Self>
    where
        F: FnOnce(&LoadedRelation) -> OrmResult<JsonValue>,
    {
        if !self.record.relation_loaded(relation) {
            return Ok(self);
        }
        let value = f(self.record.relation(relation)?)?;
        Ok(self.field(relation, value))
    }

    /// Render a loaded relation through `resource`.
    ///
    /// A to-one relation gives an object or null, a to-many relation an
    /// array. Fails with `RelationNotLoaded` when the relation was not
    /// loaded.
    pub fn relation(self, name: &str, resource: &dyn Resource) -> OrmResult<Self> {
        let value = match self.record.relation(name)? {
            LoadedRelation::One(None) => JsonValue::Null,
            LoadedRelation::One(Some(related)) => resource.to_json(related)?,
            LoadedRelation::Many(related) => render_many(resource, related)?,
        };
        Ok(self.field(name, value))
    }

    /// Render a loaded relation as `{"data": [...], "meta": {...}}`.
    ///
    /// Each meta callback receives the related records; it yields null when
    /// the relation is empty.
    pub fn relation_with_meta(
        self,
        name: &str,
        resource: &dyn Resource,
        meta: &[RelationMeta<'_>],
    ) -> OrmResult<Self> {
        let related: Vec<Record> = match self.record.relation(name)? {
            LoadedRelation::One(one) => one.iter().cloned().collect(),
            LoadedRelation::Many(many) => many.clone(),
        };
        let mut envelope = Attributes::new();
        envelope.insert("data".to_string(), render_many(resource, &related)?);
        if !meta.is_empty() {
            let values: Attributes = meta
                .iter()
                .map(|(key, f)| {
                    let value = if related.is_empty() { JsonValue::Null } else { f(&related) };
                    (key.to_string(), value)
                })
                .collect();
            envelope.insert("meta".to_string(), JsonValue::Object(values));
        }
        Ok(self.field(name, JsonValue::Object(envelope)))
    }

    pub fn merge(mut self, attributes: Attributes) -> Self {
        self.values.extend(attributes);
        self
    }

    pub fn merge_when(self, condition: bool, attributes: Attributes) -> Self {
        if condition { self.merge(attributes) } else { self }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    pub fn into_attributes(self) -> Attributes {
        self.values
    }

    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(self.values)
    }
}

pub(crate) fn render_many(resource: &dyn Resource, records: &[Record]) -> OrmResult<JsonValue> {
    records
        .iter()
        .map(|record| resource.to_json(record))
        .collect::<OrmResult<Vec<_>>>()
        .map(JsonValue::Array)
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> OrmResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| OrmError::Attribute(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RecordResource;
    use crate::resource::tests::{post, user};
    use serde_json::json;

    #[test]
    fn test_conditional_fields() {
        let user = user(json!({"id": 1, "name": "Jane", "email": "jane@example.com"}));
        let out = Fields::new(&user)
            .attribute("id")
            .unwrap()
            .when("email", false, "hidden")
            .when_or("tier", false, "premium", "basic")
            .merge_when(true, json!({"admin": true}).as_object().cloned().unwrap())
            .merge_when(false, json!({"secret": 1}).as_object().cloned().unwrap())
            .into_json();

        assert_eq!(out, json!({"id": 1, "tier": "basic", "admin": true}));
    }

    #[test]
    fn test_relation_requires_loading() {
        let user = user(json!({"id": 1}));
        let err = Fields::new(&user).relation("posts", &RecordResource).unwrap_err();
        assert!(matches!(err, OrmError::RelationNotLoaded { relation, .. } if relation == "posts"));

        let skipped = Fields::new(&user)
            .when_loaded("posts", |r| r.to_json())
            .unwrap()
            .into_json();
        assert_eq!(skipped, json!({}));
    }

    #[test]
    fn test_relation_renders_each_record() {
        let mut user = user(json!({"id": 1}));
        user.set_relation(
            "posts",
            LoadedRelation::Many(vec![post(json!({"id": 7, "title": "Hi"}))]),
        );
        user.set_relation("profile", LoadedRelation::One(None));

        let out = Fields::new(&user)
            .relation("posts", &RecordResource)
            .unwrap()
            .relation("profile", &RecordResource)
            .unwrap()
            .into_json();
        assert_eq!(out, json!({"posts": [{"id": 7, "title": "Hi"}], "profile": null}));
    }

    #[test]
    fn test_relation_with_meta() {
        let mut user = user(json!({"id": 1}));
        user.set_relation(
            "posts",
            LoadedRelation::Many(vec![post(json!({"id": 1})), post(json!({"id": 2}))]),
        );
        user.set_relation("drafts", LoadedRelation::Many(vec![]));

        let count: &dyn Fn(&[Record]) -> JsonValue = &|posts| json!(posts.len());
        let out = Fields::new(&user)
            .relation_with_meta("posts", &RecordResource, &[("count", count)])
            .unwrap()
            .relation_with_meta("drafts", &RecordResource, &[("count", count)])
            .unwrap()
            .into_json();

        assert_eq!(out["posts"]["meta"], json!({"count": 2}));
        assert_eq!(out["posts"]["data"][1]["id"], json!(2));
        assert_eq!(out["drafts"], json!({"data": [], "meta": {"count": null}}));
    }
}
