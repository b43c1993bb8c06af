//! The ORM handle: model registry, casts, events, connections and record
//! persistence.

use std::fmt;
use std::sync::Arc;

use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DbConn};

use quarry_core::value::is_blank;
use quarry_core::{Attributes, Cast, CastRegistry, JsonValue, OrmError, OrmResult, Validator};

use crate::database::DatabaseConnections;
use crate::database::executor;
use crate::database::values::{now, value_expr};
use crate::events::{EventDispatcher, ModelEvent, Observer};
use crate::model::{CREATED_AT, DELETED_AT, Model, ModelDef, ModelMeta, ModelRegistry, Record, UPDATED_AT};
use crate::query::{AggregateBuilder, QueryBuilder, eager};
use crate::relations::{Relation, associate_record};

struct OrmInner {
    connections: DatabaseConnections,
    models: ModelRegistry,
    casts: CastRegistry,
    events: EventDispatcher,
}

/// Shared ORM handle. Cloning is cheap; registries are immutable once built.
#[derive(Clone)]
pub struct Orm {
    inner: Arc<OrmInner>,
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orm")
            .field("models", &self.inner.models.names())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

/// Collects models, casts and listeners, then freezes them into an [`Orm`].
pub struct OrmBuilder {
    connections: DatabaseConnections,
    models: Vec<ModelDef>,
    aliases: Vec<(String, String)>,
    casts: CastRegistry,
    events: EventDispatcher,
}

impl OrmBuilder {
    pub fn model(mut self, mut def: ModelDef) -> Self {
        let name = def.name.clone();
        for (event, listener) in std::mem::take(&mut def.hooks) {
            self.events.listen(&name, event, listener);
        }
        self.models.push(def);
        self
    }

    pub fn register<M: Model>(self) -> Self {
        self.model(M::definition())
    }

    /// Extra lookup name for a registered model.
    pub fn alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), model.into()));
        self
    }

    /// Custom cast, usable by name in model definitions.
    pub fn cast(mut self, name: impl Into<String>, cast: impl Cast + 'static) -> Self {
        self.casts.register(name, cast);
        self
    }

    pub fn observe(mut self, model: &str, observer: impl Observer + 'static) -> Self {
        self.events.observe(model, Arc::new(observer));
        self
    }

    pub fn listen<F>(mut self, model: &str, event: ModelEvent, listener: F) -> Self
    where
        F: Fn(&mut Record) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.events.listen(model, event, Arc::new(listener));
        self
    }

    /// Listener for every event of every model.
    pub fn listen_any<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &mut Record) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.events.listen_any(Arc::new(listener));
        self
    }

    /// Resolve casts and register every model. Relation targets are
    /// resolved when first used.
    pub fn build(self) -> OrmResult<Orm> {
        let mut models = ModelRegistry::new();
        for def in self.models {
            models.insert(def.into_meta(&self.casts)?);
        }
        for (alias, model) in &self.aliases {
            if !models.contains(model) {
                return Err(OrmError::UnknownModel(model.clone()));
            }
            models.alias(alias, model);
        }
        tracing::info!(models = models.len(), "ORM initialized");

        Ok(Orm {
            inner: Arc::new(OrmInner {
                connections: self.connections,
                models,
                casts: self.casts,
                events: self.events,
            }),
        })
    }
}

impl Orm {
    pub fn builder(connections: DatabaseConnections) -> OrmBuilder {
        OrmBuilder {
            connections,
            models: Vec::new(),
            aliases: Vec::new(),
            casts: CastRegistry::with_defaults(),
            events: EventDispatcher::new(),
        }
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }

    pub fn casts(&self) -> &CastRegistry {
        &self.inner.casts
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    pub fn connections(&self) -> &DatabaseConnections {
        &self.inner.connections
    }

    pub fn meta(&self, model: &str) -> OrmResult<Arc<ModelMeta>> {
        self.inner.models.resolve(model)
    }

    /// The connection a model's table lives on.
    pub fn connection_for(&self, meta: &ModelMeta) -> OrmResult<&DbConn> {
        self.inner.connections.resolve(meta.connection.as_deref())
    }

    pub fn query(&self, model: &str) -> OrmResult<QueryBuilder> {
        Ok(QueryBuilder::new(self.clone(), self.meta(model)?))
    }

    pub fn aggregate(&self, model: &str) -> OrmResult<AggregateBuilder> {
        Ok(self.query(model)?.into_aggregate())
    }

    /// Lazy handle on one relation of a record.
    pub fn relation(&self, record: &Record, name: &str) -> OrmResult<Relation> {
        Relation::new(self.clone(), record, name)
    }

    /// Eager load relations onto records already fetched.
    pub async fn load(&self, records: &mut [Record], relations: &[&str]) -> OrmResult<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let model = Arc::clone(first.meta());
        if records.iter().any(|r| !Arc::ptr_eq(r.meta(), &model)) {
            return Err(OrmError::InvalidQuery(
                "load expects records of a single model".to_string(),
            ));
        }
        for relation in relations {
            let root = relation.split('.').next().unwrap_or(relation);
            model.relation(root)?;
        }
        let paths = relations.iter().map(|r| (r.to_string(), None)).collect();
        eager::load(self, records, paths).await
    }

    /// New unsaved record, mass assignment checked.
    pub fn make(&self, model: &str, attributes: Attributes) -> OrmResult<Record> {
        let mut record = Record::new(self.meta(model)?);
        record.fill(attributes)?;
        Ok(record)
    }

    pub async fn create(&self, model: &str, attributes: Attributes) -> OrmResult<Record> {
        let mut record = self.make(model, attributes)?;
        self.save(&mut record).await?;
        Ok(record)
    }

    /// Insert or update, with events, validation and timestamps.
    pub async fn save(&self, record: &mut Record) -> OrmResult<()> {
        let events = &self.inner.events;
        events.dispatch(ModelEvent::Saving, record)?;

        let meta = Arc::clone(record.meta());
        if !meta.rules.is_empty() {
            Validator::new(record.attributes().clone(), meta.rules.clone()).validated()?;
        }

        if record.exists() {
            self.perform_update(record).await?;
        } else {
            self.perform_insert(record).await?;
        }
        events.dispatch(ModelEvent::Saved, record)
    }

    async fn perform_insert(&self, record: &mut Record) -> OrmResult<()> {
        self.inner.events.dispatch(ModelEvent::Creating, record)?;
        let meta = Arc::clone(record.meta());
        if meta.timestamps {
            let stamp = now();
            for column in [CREATED_AT, UPDATED_AT] {
                if is_blank(record.get(column)) {
                    record.set_raw(column, stamp.clone());
                }
            }
        }

        let conn = self.connection_for(&meta)?;
        let backend = conn.get_database_backend();
        let attributes = record.attributes().clone();
        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(&meta.table));
        if attributes.is_empty() {
            stmt.or_default_values();
        } else {
            stmt.columns(attributes.keys().map(Alias::new));
            stmt.values(
                attributes
                    .iter()
                    .map(|(column, value)| value_expr(value, meta.db_type(column))),
            )
            .map_err(|e| OrmError::Query(format!("Invalid insert into {}: {e}", meta.table)))?;
        }

        if conn.support_returning() {
            stmt.returning_all();
            let row = executor::fetch_one(conn, executor::build(backend, &stmt))
                .await?
                .ok_or_else(|| OrmError::Query(format!("Insert into {} returned no row", meta.table)))?;
            record.replace_attributes(row);
        } else {
            let result = executor::execute(conn, executor::build(backend, &stmt)).await?;
            if record.key().is_none() {
                record.set_raw(meta.primary_key.clone(), result.last_insert_id());
            }
        }
        record.sync_original();
        tracing::debug!(model = %meta.name, key = ?record.key(), "Inserted record");

        self.inner.events.dispatch(ModelEvent::Created, record)
    }

    fn key_condition(meta: &ModelMeta, record: &Record) -> OrmResult<SimpleExpr> {
        let key = record.key().ok_or_else(|| {
            OrmError::Attribute(format!(
                "{} has no '{}' value to address the row",
                meta.name, meta.primary_key
            ))
        })?;
        Ok(Expr::col(Alias::new(&meta.primary_key)).eq(value_expr(key, meta.db_type(&meta.primary_key))))
    }

    async fn write_columns(&self, meta: &ModelMeta, record: &Record, values: &Attributes) -> OrmResult<u64> {
        let assignments: Vec<(Alias, SimpleExpr)> = values
            .iter()
            .map(|(column, value)| (Alias::new(column), value_expr(value, meta.db_type(column))))
            .collect();
        let mut stmt = Query::update();
        stmt.table(Alias::new(&meta.table))
            .values(assignments)
            .and_where(Self::key_condition(meta, record)?);
        let conn = self.connection_for(meta)?;
        let result = executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        Ok(result.rows_affected())
    }

    async fn perform_update(&self, record: &mut Record) -> OrmResult<()> {
        if !record.is_dirty() {
            return Ok(());
        }
        self.inner.events.dispatch(ModelEvent::Updating, record)?;
        let meta = Arc::clone(record.meta());
        if meta.timestamps && !record.is_attribute_dirty(UPDATED_AT) {
            record.set_raw(UPDATED_AT, now());
        }
        let dirty = record.dirty();
        self.write_columns(&meta, record, &dirty).await?;
        record.sync_original();
        tracing::debug!(model = %meta.name, key = ?record.key(), columns = dirty.len(), "Updated record");

        self.inner.events.dispatch(ModelEvent::Updated, record)
    }

    fn ensure_persisted(record: &Record, operation: &str) -> OrmResult<()> {
        if record.exists() {
            Ok(())
        } else {
            Err(OrmError::InvalidQuery(format!(
                "Cannot {operation} a {} that was never saved",
                record.model_name()
            )))
        }
    }

    /// Delete a record; soft when the model soft-deletes.
    pub async fn delete(&self, record: &mut Record) -> OrmResult<()> {
        if !record.meta().soft_deletes {
            return self.force_delete(record).await;
        }
        Self::ensure_persisted(record, "delete")?;
        self.inner.events.dispatch(ModelEvent::Deleting, record)?;

        let meta = Arc::clone(record.meta());
        let stamp = now();
        let mut values = Attributes::new();
        values.insert(DELETED_AT.to_string(), stamp.clone());
        if meta.timestamps {
            values.insert(UPDATED_AT.to_string(), stamp);
        }
        self.write_columns(&meta, record, &values).await?;
        for (column, value) in values {
            record.set_raw(column, value);
        }
        record.sync_original();
        tracing::debug!(model = %meta.name, key = ?record.key(), "Soft deleted record");

        self.inner.events.dispatch(ModelEvent::Deleted, record)
    }

    /// Remove the row, even for soft-deleting models.
    pub async fn force_delete(&self, record: &mut Record) -> OrmResult<()> {
        Self::ensure_persisted(record, "delete")?;
        self.inner.events.dispatch(ModelEvent::Deleting, record)?;

        let meta = Arc::clone(record.meta());
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(&meta.table))
            .and_where(Self::key_condition(&meta, record)?);
        let conn = self.connection_for(&meta)?;
        executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        record.mark_deleted();
        tracing::debug!(model = %meta.name, key = ?record.key(), "Deleted record");

        self.inner.events.dispatch(ModelEvent::Deleted, record)
    }

    /// Clear `deleted_at` on a soft-deleted record.
    pub async fn restore(&self, record: &mut Record) -> OrmResult<()> {
        let meta = Arc::clone(record.meta());
        if !meta.soft_deletes {
            return Err(OrmError::InvalidQuery(format!(
                "Model {} does not use soft deletes",
                meta.name
            )));
        }
        Self::ensure_persisted(record, "restore")?;
        self.inner.events.dispatch(ModelEvent::Restoring, record)?;

        let mut values = Attributes::new();
        values.insert(DELETED_AT.to_string(), JsonValue::Null);
        if meta.timestamps {
            values.insert(UPDATED_AT.to_string(), now());
        }
        self.write_columns(&meta, record, &values).await?;
        for (column, value) in values {
            record.set_raw(column, value);
        }
        record.sync_original();

        self.inner.events.dispatch(ModelEvent::Restored, record)
    }

    /// Reload attributes from the database and drop loaded relations.
    pub async fn refresh(&self, record: &mut Record) -> OrmResult<()> {
        let meta = Arc::clone(record.meta());
        let key = record
            .key()
            .cloned()
            .ok_or_else(|| OrmError::model_not_found(&meta.name, "null"))?;
        let fresh = QueryBuilder::new(self.clone(), Arc::clone(&meta))
            .with_trashed()
            .without_global_scopes()
            .find_or_fail(key)
            .await?;
        record.replace_attributes(fresh.attributes().clone());
        record.sync_original();
        record.clear_relations();
        Ok(())
    }

    /// Point a belongs-to / morph-to relation of `record` at `owner`.
    /// The record is not saved.
    pub fn associate(&self, record: &mut Record, relation: &str, owner: &Record) -> OrmResult<()> {
        associate_record(record, relation, Some(owner))
    }

    pub fn dissociate(&self, record: &mut Record, relation: &str) -> OrmResult<()> {
        associate_record(record, relation, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use quarry_core::validation::{Email, Required};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use serde_json::json;

    use crate::events::halt;

    fn attrs(value: JsonValue) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    fn orm_with(db: MockDatabase, configure: impl FnOnce(OrmBuilder) -> OrmBuilder) -> Orm {
        let builder = Orm::builder(DatabaseConnections::from_connection(db.into_connection()))
            .model(
                ModelDef::new("User")
                    .fillable(["name", "email"])
                    .rule("email", Required)
                    .rule("email", Email)
                    .has_many("posts", "Post"),
            )
            .model(ModelDef::new("Post").soft_deletes().belongs_to("user", "User"));
        configure(builder).build().unwrap()
    }

    fn postgres() -> MockDatabase {
        MockDatabase::new(DatabaseBackend::Postgres)
    }

    fn row(pairs: &[(&'static str, Value)]) -> BTreeMap<&'static str, Value> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_unknown_model() {
        let orm = orm_with(postgres(), |b| b);
        assert!(matches!(orm.query("Invoice"), Err(OrmError::UnknownModel(_))));
        assert!(orm.query("user").is_ok());
    }

    #[test]
    fn test_alias_must_target_registered_model() {
        let result = Orm::builder(DatabaseConnections::from_connection(postgres().into_connection()))
            .alias("Member", "User")
            .build();
        assert!(matches!(result, Err(OrmError::UnknownModel(_))));
    }

    #[test]
    fn test_make_checks_mass_assignment() {
        let orm = orm_with(postgres(), |b| b);
        let err = orm
            .make("User", attrs(json!({"name": "Ann", "is_admin": true})))
            .unwrap_err();
        assert!(matches!(err, OrmError::MassAssignment { .. }));
    }

    #[tokio::test]
    async fn test_create_returns_inserted_row_and_fires_events() {
        let db = postgres().append_query_results([vec![row(&[
            ("id", Value::from(1i64)),
            ("name", Value::from("Ann")),
            ("email", Value::from("ann@example.com")),
        ])]]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let orm = orm_with(db, move |b| {
            b.listen_any(move |key, _| {
                log.lock().unwrap().push(key.to_string());
                Ok(())
            })
        });

        let user = orm
            .create("User", attrs(json!({"name": "Ann", "email": "ann@example.com"})))
            .await
            .unwrap();

        assert!(user.exists());
        assert!(!user.is_dirty());
        assert_eq!(user.key(), Some(&json!(1)));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["User.saving", "User.creating", "User.created", "User.saved"]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_stops_save() {
        let orm = orm_with(postgres(), |b| b);
        let err = orm
            .create("User", attrs(json!({"name": "Ann", "email": "not-an-email"})))
            .await
            .unwrap_err();
        let OrmError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.get("email").is_some());
    }

    #[tokio::test]
    async fn test_listener_can_halt_creation() {
        let orm = orm_with(postgres(), |b| {
            b.listen("User", ModelEvent::Creating, |_| {
                Err(halt(ModelEvent::Creating, "registrations closed"))
            })
        });
        let err = orm
            .create("User", attrs(json!({"name": "Ann", "email": "ann@example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Halted { .. }));
    }

    #[tokio::test]
    async fn test_clean_record_saves_without_query() {
        let db = postgres().append_query_results([vec![row(&[
            ("id", Value::from(4i64)),
            ("name", Value::from("Bo")),
            ("email", Value::from("bo@example.com")),
        ])]]);
        let orm = orm_with(db, |b| b);
        let mut user = orm.query("User").unwrap().find(4).await.unwrap().unwrap();

        // the mock has no more results: a query here would fail
        orm.save(&mut user).await.unwrap();
        assert!(user.exists());
    }

    #[tokio::test]
    async fn test_soft_delete_sets_deleted_at() {
        let db = postgres()
            .append_query_results([vec![row(&[("id", Value::from(9i64)), ("user_id", Value::from(1i64))])]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);
        let orm = orm_with(db, |b| b);
        let mut post = orm.query("Post").unwrap().find(9).await.unwrap().unwrap();

        orm.delete(&mut post).await.unwrap();
        assert!(post.trashed());
        assert!(post.exists());
        assert!(orm.restore(&mut Record::new(orm.meta("User").unwrap())).await.is_err());
    }

    #[tokio::test]
    async fn test_eager_loads_has_many() {
        let db = postgres()
            .append_query_results([vec![
                row(&[("id", Value::from(1i64)), ("name", Value::from("Ann"))]),
                row(&[("id", Value::from(2i64)), ("name", Value::from("Bo"))]),
            ]])
            .append_query_results([vec![
                row(&[("id", Value::from(10i64)), ("user_id", Value::from(1i64))]),
                row(&[("id", Value::from(11i64)), ("user_id", Value::from(1i64))]),
            ]]);
        let orm = orm_with(db, |b| b);

        let users = orm.query("User").unwrap().with_("posts").get().await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].many("posts").unwrap().len(), 2);
        assert!(users[1].many("posts").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_relation() {
        let orm = orm_with(postgres(), |b| b);
        let mut records = vec![Record::new(orm.meta("User").unwrap())];
        let err = orm.load(&mut records, &["comments"]).await.unwrap_err();
        assert!(matches!(err, OrmError::InvalidRelation(_)));
    }
}
