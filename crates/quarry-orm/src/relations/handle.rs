use std::fmt;
use std::sync::Arc;

use quarry_core::{Attributes, JsonValue, Operator, OrmError, OrmResult};

use super::def::RelationDef;
use crate::model::{LoadedRelation, ModelMeta, Record};
use crate::orm::Orm;
use crate::query::QueryBuilder;

/// Lazy handle on one relation of a record.
///
/// ```no_run
/// # async fn run(orm: quarry_orm::Orm, user: quarry_orm::Record) -> quarry_core::OrmResult<()> {
/// let posts = orm.relation(&user, "posts")?;
/// let published = posts.query().where_eq("status", "published").count().await?;
/// let draft = posts
///     .create(serde_json::json!({"title": "Draft"}).as_object().cloned().unwrap_or_default())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Relation {
    pub(super) orm: Orm,
    pub(super) parent: Record,
    pub(super) name: String,
    pub(super) def: RelationDef,
    pub(super) related: Arc<ModelMeta>,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("parent", &self.parent.model_name())
            .field("name", &self.name)
            .field("kind", &self.def.kind())
            .field("related", &self.related.name)
            .finish()
    }
}

impl Relation {
    pub(crate) fn new(orm: Orm, parent: &Record, name: &str) -> OrmResult<Self> {
        let def = parent.meta().relation(name)?.clone();
        let related = match &def {
            RelationDef::MorphTo { type_column, .. } => {
                let morph = parent
                    .get(type_column)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| {
                        OrmError::MorphRelation(format!(
                            "{} has no '{type_column}' value for relation '{name}'",
                            parent.model_name()
                        ))
                    })?;
                orm.models().resolve_morph(morph).map_err(|_| {
                    OrmError::MorphRelation(format!(
                        "Cannot resolve morph type '{morph}' for relation '{name}'"
                    ))
                })?
            }
            other => orm.models().resolve(other.related().unwrap_or_default())?,
        };
        Ok(Self {
            orm,
            parent: parent.clone(),
            name: name.to_string(),
            def,
            related,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn def(&self) -> &RelationDef {
        &self.def
    }

    pub fn parent(&self) -> &Record {
        &self.parent
    }

    /// The parent, with any changes made through `associate` / `dissociate`.
    pub fn into_parent(self) -> Record {
        self.parent
    }

    pub fn related(&self) -> &Arc<ModelMeta> {
        &self.related
    }

    pub(super) fn parent_value(&self, key: &str) -> JsonValue {
        self.parent.get(key).cloned().unwrap_or(JsonValue::Null)
    }

    fn ensure_parent_saved(&self, operation: &str) -> OrmResult<()> {
        if self.parent.exists() {
            Ok(())
        } else {
            Err(OrmError::InvalidRelation(format!(
                "{operation} on relation '{}' requires a saved {}",
                self.name,
                self.parent.model_name()
            )))
        }
    }

    /// Query over the related records of this parent.
    pub fn query(&self) -> QueryBuilder {
        let query = QueryBuilder::new(self.orm.clone(), Arc::clone(&self.related));
        match &self.def {
            RelationDef::HasOne {
                foreign_key,
                local_key,
                ..
            }
            | RelationDef::HasMany {
                foreign_key,
                local_key,
                ..
            } => query.constrain_key(foreign_key, self.parent_value(local_key)),
            RelationDef::BelongsTo {
                foreign_key,
                owner_key,
                ..
            } => query.constrain_key(owner_key, self.parent_value(foreign_key)),
            RelationDef::MorphOne {
                type_column,
                id_column,
                local_key,
                ..
            }
            | RelationDef::MorphMany {
                type_column,
                id_column,
                local_key,
                ..
            } => query
                .constrain_key(id_column, self.parent_value(local_key))
                .constrain(
                    type_column,
                    Operator::Equal,
                    JsonValue::from(self.parent.meta().morph_name.clone()),
                ),
            RelationDef::BelongsToMany(pivot) => {
                let column = format!("{}.{}", pivot.table, pivot.foreign_pivot_key);
                query
                    .join_pivot(pivot.clone())
                    .constrain_key(&column, self.parent_value(&pivot.parent_key))
            }
            RelationDef::MorphTo { id_column, .. } => {
                let key = self.related.primary_key.clone();
                query.constrain_key(&key, self.parent_value(id_column))
            }
        }
    }

    pub async fn get(&self) -> OrmResult<Vec<Record>> {
        self.query().get().await
    }

    pub async fn first(&self) -> OrmResult<Option<Record>> {
        self.query().first().await
    }

    pub async fn count(&self) -> OrmResult<u64> {
        self.query().count().await
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        self.query().exists().await
    }

    /// Point a child at the parent through the relation's key columns.
    fn link_child(&self, child: &mut Record) -> OrmResult<()> {
        match &self.def {
            RelationDef::HasOne {
                foreign_key,
                local_key,
                ..
            }
            | RelationDef::HasMany {
                foreign_key,
                local_key,
                ..
            } => {
                child.set_raw(foreign_key, self.parent_value(local_key));
            }
            RelationDef::MorphOne {
                type_column,
                id_column,
                local_key,
                ..
            }
            | RelationDef::MorphMany {
                type_column,
                id_column,
                local_key,
                ..
            } => {
                child
                    .set_raw(id_column, self.parent_value(local_key))
                    .set_raw(type_column, self.parent.meta().morph_name.clone());
            }
            RelationDef::BelongsToMany(_) => {}
            RelationDef::BelongsTo { .. } | RelationDef::MorphTo { .. } => {
                return Err(OrmError::InvalidRelation(format!(
                    "Cannot save through {} relation '{}'; use associate",
                    self.def.kind(),
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Make, link and save a related record.
    pub async fn create(&self, attributes: Attributes) -> OrmResult<Record> {
        self.ensure_parent_saved("create")?;
        let mut child = self.orm.make(&self.related.name, attributes)?;
        self.save(&mut child).await?;
        Ok(child)
    }

    pub async fn create_many(&self, items: Vec<Attributes>) -> OrmResult<Vec<Record>> {
        let mut created = Vec::with_capacity(items.len());
        for attributes in items {
            created.push(self.create(attributes).await?);
        }
        Ok(created)
    }

    /// Link and save an existing record; many-to-many also attaches it.
    pub async fn save(&self, child: &mut Record) -> OrmResult<()> {
        self.ensure_parent_saved("save")?;
        self.link_child(child)?;
        self.orm.save(child).await?;
        if matches!(self.def, RelationDef::BelongsToMany(_)) {
            let id = child.key().cloned().ok_or_else(|| {
                OrmError::InvalidRelation(format!(
                    "Saved {} has no primary key to attach",
                    child.model_name()
                ))
            })?;
            self.sync_without_detaching(vec![id]).await?;
        }
        Ok(())
    }

    /// Update the related record matching `attributes`, or create it.
    /// Has-one and morph-one only.
    pub async fn update_or_create(&self, attributes: Attributes, values: Attributes) -> OrmResult<Record> {
        if !matches!(self.def, RelationDef::HasOne { .. } | RelationDef::MorphOne { .. }) {
            return Err(OrmError::InvalidRelation(format!(
                "update_or_create is not supported on {} relation '{}'",
                self.def.kind(),
                self.name
            )));
        }
        self.ensure_parent_saved("update_or_create")?;

        let mut query = self.query();
        for (field, value) in &attributes {
            query = query.where_eq(field, value.clone());
        }
        match query.first().await? {
            Some(mut existing) => {
                existing.fill(values)?;
                self.orm.save(&mut existing).await?;
                Ok(existing)
            }
            None => {
                let mut merged = attributes;
                merged.extend(values);
                self.create(merged).await
            }
        }
    }

    /// Set the parent's foreign key (or morph columns) to `owner`.
    /// The parent is not saved.
    pub fn associate(&mut self, owner: &Record) -> OrmResult<&Record> {
        associate_record(&mut self.parent, &self.name, Some(owner))?;
        Ok(&self.parent)
    }

    pub fn dissociate(&mut self) -> OrmResult<&Record> {
        associate_record(&mut self.parent, &self.name, None)?;
        Ok(&self.parent)
    }
}

/// Set or clear the keys of a belongs-to / morph-to relation on `record`
/// and mark the relation as loaded.
pub(crate) fn associate_record(record: &mut Record, name: &str, owner: Option<&Record>) -> OrmResult<()> {
    let def = record.meta().relation(name)?.clone();
    match &def {
        RelationDef::BelongsTo {
            foreign_key,
            owner_key,
            ..
        } => {
            let value = owner
                .and_then(|owner| owner.get(owner_key))
                .cloned()
                .unwrap_or(JsonValue::Null);
            record.set_raw(foreign_key, value);
        }
        RelationDef::MorphTo {
            type_column,
            id_column,
        } => match owner {
            Some(owner) => {
                let id = owner.key().cloned().unwrap_or(JsonValue::Null);
                record
                    .set_raw(type_column, owner.meta().morph_name.clone())
                    .set_raw(id_column, id);
            }
            None => {
                record
                    .set_raw(type_column, JsonValue::Null)
                    .set_raw(id_column, JsonValue::Null);
            }
        },
        other => {
            return Err(OrmError::InvalidRelation(format!(
                "associate needs a belongs_to or morph_to relation; '{name}' is {}",
                other.kind()
            )));
        }
    }
    record.set_relation(name, LoadedRelation::One(owner.cloned()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::CastRegistry;
    use serde_json::json;

    use crate::model::ModelDef;

    fn record(def: ModelDef, attributes: JsonValue) -> Record {
        let meta = Arc::new(def.into_meta(&CastRegistry::with_defaults()).unwrap());
        let mut record = Record::new(meta);
        record
            .force_fill(attributes.as_object().cloned().unwrap())
            .unwrap();
        record
    }

    #[test]
    fn test_associate_sets_foreign_key() {
        let mut post = record(ModelDef::new("Post").belongs_to("author", "User"), json!({"title": "x"}));
        let user = record(ModelDef::new("User"), json!({"id": 7}));

        associate_record(&mut post, "author", Some(&user)).unwrap();
        assert_eq!(post.get("author_id"), Some(&json!(7)));
        assert!(post.one("author").unwrap().is_some());

        associate_record(&mut post, "author", None).unwrap();
        assert_eq!(post.get("author_id"), Some(&JsonValue::Null));
        assert!(post.one("author").unwrap().is_none());
    }

    #[test]
    fn test_associate_morph_to_uses_morph_name() {
        let mut comment = record(ModelDef::new("Comment").morph_to("commentable"), json!({}));
        let video = record(ModelDef::new("Video").morph_name("video"), json!({"id": 3}));

        associate_record(&mut comment, "commentable", Some(&video)).unwrap();
        assert_eq!(comment.get("commentable_type"), Some(&json!("video")));
        assert_eq!(comment.get("commentable_id"), Some(&json!(3)));
    }

    #[test]
    fn test_associate_rejects_to_many() {
        let mut user = record(ModelDef::new("User").has_many("posts", "Post"), json!({"id": 1}));
        let post = record(ModelDef::new("Post"), json!({"id": 2}));
        let err = associate_record(&mut user, "posts", Some(&post)).unwrap_err();
        assert!(matches!(err, OrmError::InvalidRelation(_)));
    }
}
