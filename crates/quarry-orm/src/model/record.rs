use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use quarry_core::{Attributes, JsonValue, OrmError, OrmResult};

use super::def::{DELETED_AT, ModelMeta};

/// A loaded relation on a record.
#[derive(Debug, Clone)]
pub enum LoadedRelation {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl LoadedRelation {
    pub fn to_json(&self) -> OrmResult<JsonValue> {
        match self {
            LoadedRelation::One(None) => Ok(JsonValue::Null),
            LoadedRelation::One(Some(record)) => record.to_json(),
            LoadedRelation::Many(records) => records
                .iter()
                .map(Record::to_json)
                .collect::<OrmResult<Vec<_>>>()
                .map(JsonValue::Array),
        }
    }
}

/// One row of a model: attributes in their database representation,
/// the originals for dirty tracking, and any loaded relations.
#[derive(Clone)]
pub struct Record {
    meta: Arc<ModelMeta>,
    attributes: Attributes,
    original: Attributes,
    exists: bool,
    relations: BTreeMap<String, LoadedRelation>,
    pivot: Option<Attributes>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.meta.name)
            .field("exists", &self.exists)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Record {
    /// A new, unsaved record.
    pub fn new(meta: Arc<ModelMeta>) -> Self {
        Self {
            meta,
            attributes: Attributes::new(),
            original: Attributes::new(),
            exists: false,
            relations: BTreeMap::new(),
            pivot: None,
        }
    }

    /// A record hydrated from a database row.
    pub fn from_database(meta: Arc<ModelMeta>, attributes: Attributes) -> Self {
        Self {
            meta,
            original: attributes.clone(),
            attributes,
            exists: true,
            relations: BTreeMap::new(),
            pivot: None,
        }
    }

    /// Build an unsaved record from a typed schema value.
    pub fn from_schema<T: Serialize>(meta: Arc<ModelMeta>, value: &T) -> OrmResult<Self> {
        let attributes = match serde_json::to_value(value) {
            Ok(JsonValue::Object(map)) => map,
            Ok(other) => {
                return Err(OrmError::Attribute(format!(
                    "Schema for {} must serialize to an object, got {other}",
                    meta.name
                )));
            }
            Err(e) => return Err(OrmError::Attribute(e.to_string())),
        };
        let mut record = Self::new(meta);
        for (key, value) in attributes {
            record.set(key, value)?;
        }
        Ok(record)
    }

    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    pub fn model_name(&self) -> &str {
        &self.meta.name
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Raw attribute as stored.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.attributes.get(key)
    }

    /// Attribute with its cast applied.
    pub fn attribute(&self, key: &str) -> OrmResult<JsonValue> {
        let raw = self.attributes.get(key).unwrap_or(&JsonValue::Null);
        match self.meta.cast(key) {
            Some(cast) => cast.to_model(raw),
            None => Ok(raw.clone()),
        }
    }

    /// Cast attribute deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> OrmResult<T> {
        serde_json::from_value(self.attribute(key)?)
            .map_err(|e| OrmError::Attribute(format!("{}.{key}: {e}", self.meta.name)))
    }

    /// Set an attribute through its cast.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> OrmResult<&mut Self> {
        let key = key.into();
        let value = value.into();
        let value = match self.meta.cast(&key) {
            Some(cast) => cast.to_database(&value)?,
            None => value,
        };
        self.attributes.insert(key, value);
        Ok(self)
    }

    /// Set an attribute without casting.
    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn unset(&mut self, key: &str) -> Option<JsonValue> {
        self.attributes.remove(key)
    }

    /// Mass-assign attributes, honoring fillable / guarded.
    pub fn fill(&mut self, attributes: Attributes) -> OrmResult<&mut Self> {
        if let Some(key) = attributes.keys().find(|k| !self.meta.is_fillable(k)) {
            return Err(OrmError::MassAssignment {
                model: self.meta.name.clone(),
                attribute: key.clone(),
            });
        }
        self.force_fill(attributes)
    }

    /// Assign attributes, bypassing mass-assignment protection.
    pub fn force_fill(&mut self, attributes: Attributes) -> OrmResult<&mut Self> {
        for (key, value) in attributes {
            self.set(key, value)?;
        }
        Ok(self)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    pub fn is_attribute_dirty(&self, key: &str) -> bool {
        self.attributes.get(key) != self.original.get(key)
    }

    /// Attributes changed since the record was loaded or last saved.
    pub fn dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(k, v)| self.original.get(k.as_str()) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Primary key value.
    pub fn key(&self) -> Option<&JsonValue> {
        self.attributes
            .get(&self.meta.primary_key)
            .filter(|v| !v.is_null())
    }

    /// Soft-deleted.
    pub fn trashed(&self) -> bool {
        self.meta.soft_deletes
            && self
                .attributes
                .get(DELETED_AT)
                .is_some_and(|v| !v.is_null())
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relation(&self, name: &str) -> OrmResult<&LoadedRelation> {
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::relation_not_loaded(name, &self.meta.name))
    }

    /// Loaded to-many relation.
    pub fn many(&self, name: &str) -> OrmResult<&[Record]> {
        match self.relation(name)? {
            LoadedRelation::Many(records) => Ok(records),
            LoadedRelation::One(_) => Err(OrmError::InvalidRelation(format!(
                "Relation '{name}' on {} holds a single record",
                self.meta.name
            ))),
        }
    }

    /// Loaded to-one relation.
    pub fn one(&self, name: &str) -> OrmResult<Option<&Record>> {
        match self.relation(name)? {
            LoadedRelation::One(record) => Ok(record.as_ref()),
            LoadedRelation::Many(_) => Err(OrmError::InvalidRelation(format!(
                "Relation '{name}' on {} holds a list",
                self.meta.name
            ))),
        }
    }

    pub fn relations(&self) -> &BTreeMap<String, LoadedRelation> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: LoadedRelation) {
        self.relations.insert(name.into(), relation);
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<LoadedRelation> {
        self.relations.remove(name)
    }

    /// Pivot row attributes when loaded through a many-to-many relation.
    pub fn pivot(&self) -> Option<&Attributes> {
        self.pivot.as_ref()
    }

    pub(crate) fn set_pivot(&mut self, pivot: Attributes) {
        self.pivot = Some(pivot);
    }

    /// Accept the current attributes as persisted.
    pub(crate) fn sync_original(&mut self) {
        self.original = self.attributes.clone();
        self.exists = true;
    }

    pub(crate) fn replace_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.exists = false;
    }

    pub(crate) fn clear_relations(&mut self) {
        self.relations.clear();
    }

    /// Public representation: casts applied, hidden attributes removed,
    /// loaded relations nested.
    pub fn to_json(&self) -> OrmResult<JsonValue> {
        let mut out = Attributes::new();
        for key in self.attributes.keys() {
            if self.meta.is_hidden(key) {
                continue;
            }
            out.insert(key.clone(), self.attribute(key)?);
        }
        if let Some(pivot) = &self.pivot {
            out.insert("pivot".to_string(), JsonValue::Object(pivot.clone()));
        }
        for (name, relation) in &self.relations {
            if self.meta.is_hidden(name) {
                continue;
            }
            out.insert(name.clone(), relation.to_json()?);
        }
        Ok(JsonValue::Object(out))
    }

    /// Deserialize the public representation into a typed schema.
    pub fn to_schema<T: DeserializeOwned>(&self) -> OrmResult<T> {
        serde_json::from_value(self.to_json()?).map_err(|e| {
            let mut errors = quarry_core::ValidationErrors::new();
            errors.add(self.meta.name.clone(), e.to_string());
            OrmError::Validation(errors)
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDef;
    use quarry_core::CastRegistry;
    use serde::Deserialize;
    use serde_json::json;

    fn user_meta() -> Arc<ModelMeta> {
        let def = ModelDef::new("User")
            .cast("settings", "json")
            .cast("is_admin", "bool")
            .fillable(["name", "email", "settings"])
            .hidden(["password"]);
        Arc::new(def.into_meta(&CastRegistry::with_defaults()).unwrap())
    }

    fn attrs(value: JsonValue) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_dirty_tracking() {
        let mut user = Record::from_database(user_meta(), attrs(json!({"id": 1, "name": "Jane"})));
        assert!(!user.is_dirty());

        user.set("name", "Janet").unwrap();
        assert!(user.is_dirty());
        assert!(user.is_attribute_dirty("name"));
        assert_eq!(user.dirty(), attrs(json!({"name": "Janet"})));

        user.sync_original();
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_fill_rejects_guarded_attribute() {
        let mut user = Record::new(user_meta());
        let err = user.fill(attrs(json!({"name": "Jane", "is_admin": true}))).unwrap_err();
        assert!(matches!(err, OrmError::MassAssignment { attribute, .. } if attribute == "is_admin"));
    }

    #[test]
    fn test_casts_apply_on_read() {
        let user = Record::from_database(
            user_meta(),
            attrs(json!({"id": 1, "settings": "{\"theme\":\"dark\"}", "is_admin": 0})),
        );
        assert_eq!(user.attribute("settings").unwrap(), json!({"theme": "dark"}));
        assert_eq!(user.attribute("is_admin").unwrap(), json!(false));
        assert_eq!(user.attribute("missing").unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_to_json_hides_and_nests() {
        let meta = user_meta();
        let mut user = Record::from_database(
            Arc::clone(&meta),
            attrs(json!({"id": 1, "name": "Jane", "password": "secret"})),
        );
        user.set_relation("friends", LoadedRelation::Many(vec![Record::from_database(
            meta,
            attrs(json!({"id": 2, "name": "Joe"})),
        )]));

        let json = user.to_json().unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["friends"][0]["name"], json!("Joe"));
    }

    #[test]
    fn test_relation_not_loaded() {
        let user = Record::new(user_meta());
        assert!(matches!(user.many("posts"), Err(OrmError::RelationNotLoaded { .. })));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct UserSchema {
        id: i64,
        name: String,
    }

    #[test]
    fn test_schema_round_trip() {
        let user = Record::from_database(user_meta(), attrs(json!({"id": 1, "name": "Jane"})));
        let schema: UserSchema = user.to_schema().unwrap();
        assert_eq!(schema, UserSchema { id: 1, name: "Jane".into() });

        let back = Record::from_schema(user_meta(), &schema).unwrap();
        assert!(!back.exists());
        assert_eq!(back.get("name"), Some(&json!("Jane")));

        let bad = Record::from_database(user_meta(), attrs(json!({"id": "x"})));
        assert!(matches!(bad.to_schema::<UserSchema>(), Err(OrmError::Validation(_))));
    }
}
