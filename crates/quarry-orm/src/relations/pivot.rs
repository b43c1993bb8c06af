//! Attaching, detaching and syncing many-to-many pivot rows.

use std::collections::BTreeSet;

use sea_orm::sea_query::{Alias, Condition, Expr, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Serialize;

use quarry_core::value::key_string;
use quarry_core::{Attributes, DbType, JsonValue, OrmError, OrmResult};

use super::def::{PivotDef, RelationDef};
use super::handle::Relation;
use crate::database::executor::{self, db_error};
use crate::database::values::{now, value_expr};
use crate::model::{CREATED_AT, UPDATED_AT};

/// Related ids touched by a sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<JsonValue>,
    pub detached: Vec<JsonValue>,
    pub updated: Vec<JsonValue>,
}

/// Pivot writes needed to move from the current rows to the desired ones.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SyncPlan {
    pub attach: Vec<(JsonValue, Attributes)>,
    pub detach: Vec<JsonValue>,
    pub update: Vec<(JsonValue, Attributes)>,
}

/// Diff pivot rows by related id. An existing row is updated only when a
/// desired pivot attribute differs from what is stored.
pub(crate) fn sync_diff(
    current: &[(JsonValue, Attributes)],
    desired: &[(JsonValue, Attributes)],
    detaching: bool,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut wanted = BTreeSet::new();

    for (id, attributes) in desired {
        let Some(key) = key_string(id) else {
            continue;
        };
        if !wanted.insert(key.clone()) {
            continue;
        }
        let existing = current
            .iter()
            .find(|(current_id, _)| key_string(current_id).as_deref() == Some(key.as_str()));
        match existing {
            None => plan.attach.push((id.clone(), attributes.clone())),
            Some((_, stored)) => {
                let changed = attributes
                    .iter()
                    .any(|(column, value)| stored.get(column) != Some(value));
                if changed {
                    plan.update.push((id.clone(), attributes.clone()));
                }
            }
        }
    }

    if detaching {
        plan.detach = current
            .iter()
            .filter(|(id, _)| key_string(id).is_some_and(|key| !wanted.contains(&key)))
            .map(|(id, _)| id.clone())
            .collect();
    }
    plan
}

fn bare(ids: Vec<JsonValue>) -> Vec<(JsonValue, Attributes)> {
    ids.into_iter().map(|id| (id, Attributes::new())).collect()
}

impl Relation {
    fn pivot_def(&self) -> OrmResult<&PivotDef> {
        match &self.def {
            RelationDef::BelongsToMany(pivot) => Ok(pivot),
            other => Err(OrmError::InvalidRelation(format!(
                "Pivot operations need a belongs_to_many relation; '{}' is {}",
                self.name,
                other.kind()
            ))),
        }
    }

    /// Pivot definition and the parent's key value.
    fn pivot_parts(&self) -> OrmResult<(&PivotDef, JsonValue)> {
        let pivot = self.pivot_def()?;
        let parent = self.parent_value(&pivot.parent_key);
        if parent.is_null() {
            return Err(OrmError::InvalidRelation(format!(
                "{} must be saved before its '{}' pivot rows can change",
                self.parent.model_name(),
                self.name
            )));
        }
        Ok((pivot, parent))
    }

    fn parent_hint(&self, pivot: &PivotDef) -> Option<DbType> {
        self.parent.meta().db_type(&pivot.parent_key)
    }

    fn related_hint(&self, pivot: &PivotDef) -> Option<DbType> {
        self.related.db_type(&pivot.related_key)
    }

    fn owned_by(&self, pivot: &PivotDef, parent: &JsonValue) -> SimpleExpr {
        Expr::col((Alias::new(&pivot.table), Alias::new(&pivot.foreign_pivot_key)))
            .eq(value_expr(parent, self.parent_hint(pivot)))
    }

    fn related_in(&self, pivot: &PivotDef, ids: &[JsonValue]) -> SimpleExpr {
        let hint = self.related_hint(pivot);
        Expr::col((Alias::new(&pivot.table), Alias::new(&pivot.related_pivot_key)))
            .is_in(ids.iter().map(|id| value_expr(id, hint)))
    }

    async fn pivot_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        pivot: &PivotDef,
        parent: &JsonValue,
    ) -> OrmResult<Vec<(JsonValue, Attributes)>> {
        let mut select = Query::select();
        select
            .from(Alias::new(&pivot.table))
            .exprs(
                pivot
                    .selected_columns()
                    .iter()
                    .map(|col| Expr::col((Alias::new(&pivot.table), Alias::new(col)))),
            )
            .and_where(self.owned_by(pivot, parent));
        let rows = executor::fetch_all(conn, executor::build(conn.get_database_backend(), &select)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                let id = row.remove(&pivot.related_pivot_key)?;
                row.remove(&pivot.foreign_pivot_key);
                Some((id, row))
            })
            .collect())
    }

    async fn insert_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        pivot: &PivotDef,
        parent: &JsonValue,
        rows: &[(JsonValue, Attributes)],
    ) -> OrmResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut extra: Vec<&String> = Vec::new();
        for (_, attributes) in rows {
            for column in attributes.keys() {
                if !extra.contains(&column) {
                    extra.push(column);
                }
            }
        }
        let stamp = now();
        let stamped = pivot.timestamps;

        let mut columns = vec![pivot.foreign_pivot_key.clone(), pivot.related_pivot_key.clone()];
        columns.extend(extra.iter().map(|c| c.to_string()));
        if stamped {
            for col in [CREATED_AT, UPDATED_AT] {
                if !columns.iter().any(|c| c == col) {
                    columns.push(col.to_string());
                }
            }
        }

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(&pivot.table))
            .columns(columns.iter().map(Alias::new));
        for (id, attributes) in rows {
            let mut values = vec![
                value_expr(parent, self.parent_hint(pivot)),
                value_expr(id, self.related_hint(pivot)),
            ];
            for column in &columns[2..] {
                let value = match attributes.get(column) {
                    Some(value) => value.clone(),
                    None if stamped && (column == CREATED_AT || column == UPDATED_AT) => stamp.clone(),
                    None => JsonValue::Null,
                };
                let hint = if column == CREATED_AT || column == UPDATED_AT {
                    Some(DbType::DateTime)
                } else {
                    None
                };
                values.push(value_expr(&value, hint));
            }
            stmt.values(values)
                .map_err(|e| OrmError::Query(format!("Invalid pivot insert: {e}")))?;
        }
        executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        Ok(())
    }

    async fn delete_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        pivot: &PivotDef,
        parent: &JsonValue,
        ids: Option<&[JsonValue]>,
    ) -> OrmResult<u64> {
        let mut condition = Condition::all().add(self.owned_by(pivot, parent));
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(0);
            }
            condition = condition.add(self.related_in(pivot, ids));
        }
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(&pivot.table)).cond_where(condition);
        let result = executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        Ok(result.rows_affected())
    }

    async fn update_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        pivot: &PivotDef,
        parent: &JsonValue,
        id: &JsonValue,
        attributes: &Attributes,
    ) -> OrmResult<u64> {
        let mut attributes = attributes.clone();
        if pivot.timestamps && !attributes.contains_key(UPDATED_AT) {
            attributes.insert(UPDATED_AT.to_string(), now());
        }
        if attributes.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<(Alias, SimpleExpr)> = attributes
            .iter()
            .map(|(column, value)| {
                let hint = (column == CREATED_AT || column == UPDATED_AT).then_some(DbType::DateTime);
                (Alias::new(column), value_expr(value, hint))
            })
            .collect();
        let mut stmt = Query::update();
        stmt.table(Alias::new(&pivot.table))
            .values(assignments)
            .cond_where(
                Condition::all()
                    .add(self.owned_by(pivot, parent))
                    .add(self.related_in(pivot, std::slice::from_ref(id))),
            );
        let result = executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        Ok(result.rows_affected())
    }

    /// Related ids currently attached to the parent.
    pub async fn current_pivot_ids(&self) -> OrmResult<Vec<JsonValue>> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        let rows = self.pivot_rows(conn, pivot, &parent).await?;
        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }

    pub async fn attach(&self, ids: Vec<JsonValue>) -> OrmResult<()> {
        self.attach_with(bare(ids)).await
    }

    /// Attach ids with extra pivot attributes.
    pub async fn attach_with(&self, rows: Vec<(JsonValue, Attributes)>) -> OrmResult<()> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        self.insert_rows(conn, pivot, &parent, &rows).await?;
        tracing::debug!(relation = %self.name, count = rows.len(), "Attached pivot rows");
        Ok(())
    }

    /// Remove the pivot rows for `ids`.
    pub async fn detach(&self, ids: Vec<JsonValue>) -> OrmResult<u64> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        self.delete_rows(conn, pivot, &parent, Some(ids.as_slice())).await
    }

    /// Remove every pivot row of the parent.
    pub async fn detach_all(&self) -> OrmResult<u64> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        self.delete_rows(conn, pivot, &parent, None).await
    }

    /// Make `ids` the exact attached set.
    pub async fn sync(&self, ids: Vec<JsonValue>) -> OrmResult<SyncChanges> {
        self.sync_rows(bare(ids), true).await
    }

    /// `sync` with pivot attributes per id.
    pub async fn sync_with(&self, rows: Vec<(JsonValue, Attributes)>) -> OrmResult<SyncChanges> {
        self.sync_rows(rows, true).await
    }

    /// Attach missing ids, keep everything else.
    pub async fn sync_without_detaching(&self, ids: Vec<JsonValue>) -> OrmResult<SyncChanges> {
        self.sync_rows(bare(ids), false).await
    }

    async fn sync_rows(&self, desired: Vec<(JsonValue, Attributes)>, detaching: bool) -> OrmResult<SyncChanges> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        let txn = conn.begin().await.map_err(db_error)?;

        let current = self.pivot_rows(&txn, pivot, &parent).await?;
        let plan = sync_diff(&current, &desired, detaching);

        self.delete_rows(&txn, pivot, &parent, Some(plan.detach.as_slice())).await?;
        self.insert_rows(&txn, pivot, &parent, &plan.attach).await?;
        for (id, attributes) in &plan.update {
            self.update_row(&txn, pivot, &parent, id, attributes).await?;
        }
        txn.commit()
            .await
            .map_err(|e| OrmError::Transaction(e.to_string()))?;

        let changes = SyncChanges {
            attached: plan.attach.into_iter().map(|(id, _)| id).collect(),
            detached: plan.detach,
            updated: plan.update.into_iter().map(|(id, _)| id).collect(),
        };
        tracing::debug!(
            relation = %self.name,
            attached = changes.attached.len(),
            detached = changes.detached.len(),
            updated = changes.updated.len(),
            "Synced pivot rows"
        );
        Ok(changes)
    }

    /// Detach attached ids and attach the others.
    pub async fn toggle(&self, ids: Vec<JsonValue>) -> OrmResult<SyncChanges> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        let txn = conn.begin().await.map_err(db_error)?;

        let current: BTreeSet<String> = self
            .pivot_rows(&txn, pivot, &parent)
            .await?
            .iter()
            .filter_map(|(id, _)| key_string(id))
            .collect();
        let (detach, attach): (Vec<JsonValue>, Vec<JsonValue>) = ids
            .into_iter()
            .partition(|id| key_string(id).is_some_and(|key| current.contains(&key)));

        self.delete_rows(&txn, pivot, &parent, Some(detach.as_slice())).await?;
        let rows = bare(attach);
        self.insert_rows(&txn, pivot, &parent, &rows).await?;
        txn.commit()
            .await
            .map_err(|e| OrmError::Transaction(e.to_string()))?;

        Ok(SyncChanges {
            attached: rows.into_iter().map(|(id, _)| id).collect(),
            detached: detach,
            updated: Vec::new(),
        })
    }

    /// Update the pivot attributes of one attached id.
    pub async fn update_existing_pivot(&self, id: impl Into<JsonValue>, attributes: Attributes) -> OrmResult<u64> {
        let (pivot, parent) = self.pivot_parts()?;
        let conn = self.orm.connection_for(self.parent.meta())?;
        self.update_row(conn, pivot, &parent, &id.into(), &attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Value};

    /// Second handle onto the same mock connection (`DatabaseConnection` is not
    /// `Clone` under sea-orm's `mock` feature; the mock itself is behind an `Arc`).
    fn share(conn: &sea_orm::DatabaseConnection) -> sea_orm::DatabaseConnection {
        match conn {
            sea_orm::DatabaseConnection::MockDatabaseConnection(mock) => {
                sea_orm::DatabaseConnection::MockDatabaseConnection(mock.clone())
            }
            _ => unreachable!("tests only use mock connections"),
        }
    }
    use serde_json::json;

    use crate::database::DatabaseConnections;
    use crate::model::{ModelDef, Record};
    use crate::orm::Orm;

    fn row(id: i64, attributes: JsonValue) -> (JsonValue, Attributes) {
        (json!(id), attributes.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_sync_attaches_and_detaches() {
        let current = vec![row(1, json!({})), row(2, json!({}))];
        let desired = vec![row(2, json!({})), row(3, json!({}))];
        let plan = sync_diff(&current, &desired, true);
        assert_eq!(plan.attach, vec![row(3, json!({}))]);
        assert_eq!(plan.detach, vec![json!(1)]);
        assert!(plan.update.is_empty());
    }

    #[test]
    fn test_sync_without_detaching_keeps_rows() {
        let current = vec![row(1, json!({}))];
        let plan = sync_diff(&current, &[row(2, json!({}))], false);
        assert_eq!(plan.attach.len(), 1);
        assert!(plan.detach.is_empty());
    }

    #[test]
    fn test_sync_updates_changed_pivot_attributes() {
        let current = vec![row(1, json!({"level": "read"})), row(2, json!({"level": "write"}))];
        let desired = vec![row(1, json!({"level": "admin"})), row(2, json!({"level": "write"}))];
        let plan = sync_diff(&current, &desired, true);
        assert_eq!(plan.update, vec![row(1, json!({"level": "admin"}))]);
        assert!(plan.attach.is_empty());
        assert!(plan.detach.is_empty());
    }

    #[test]
    fn test_sync_matches_keys_across_representations() {
        let current = vec![(json!("5"), Attributes::new())];
        let plan = sync_diff(&current, &[row(5, json!({})), row(5, json!({}))], true);
        assert_eq!(plan, SyncPlan::default());
    }

    fn orm(conn: DatabaseConnection) -> Orm {
        Orm::builder(DatabaseConnections::from_connection(conn))
            .model(ModelDef::new("User").belongs_to_many("roles", "Role"))
            .model(ModelDef::new("Role"))
            .build()
            .unwrap()
    }

    fn user(orm: &Orm) -> Record {
        let mut user = Record::new(orm.meta("User").unwrap());
        user.set_raw("id", 1);
        user
    }

    fn attached(role: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("user_id", Value::from(1i64)), ("role_id", Value::from(role))])
    }

    fn affected(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    /// Statements of the single logged transaction.
    fn transaction(conn: DatabaseConnection) -> Vec<String> {
        let log = conn.into_transaction_log();
        assert_eq!(log.len(), 1, "{log:?}");
        log[0].statements().iter().map(|stmt| stmt.sql.clone()).collect()
    }

    #[tokio::test]
    async fn test_sync_writes_inside_one_transaction() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![attached(1), attached(2)]])
            .append_exec_results([affected(1), affected(1)])
            .into_connection();
        let orm = orm(share(&conn));

        let changes = orm
            .relation(&user(&orm), "roles")
            .unwrap()
            .sync(vec![json!(2), json!(3)])
            .await
            .unwrap();

        assert_eq!(changes.attached, vec![json!(3)]);
        assert_eq!(changes.detached, vec![json!(1)]);
        assert!(changes.updated.is_empty());

        let sql = transaction(conn);
        assert_eq!(sql.len(), 5, "{sql:?}");
        assert_eq!(sql[0], "BEGIN");
        assert!(sql[1].starts_with("SELECT"), "{}", sql[1]);
        assert!(sql[2].starts_with(r#"DELETE FROM "role_user""#), "{}", sql[2]);
        assert!(sql[3].starts_with(r#"INSERT INTO "role_user""#), "{}", sql[3]);
        assert_eq!(sql[4], "COMMIT");
    }

    #[tokio::test]
    async fn test_toggle_writes_inside_one_transaction() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![attached(1)]])
            .append_exec_results([affected(1), affected(1)])
            .into_connection();
        let orm = orm(share(&conn));

        let changes = orm
            .relation(&user(&orm), "roles")
            .unwrap()
            .toggle(vec![json!(1), json!(2)])
            .await
            .unwrap();

        assert_eq!(changes.detached, vec![json!(1)]);
        assert_eq!(changes.attached, vec![json!(2)]);

        let sql = transaction(conn);
        assert_eq!(sql.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
        assert!(sql.iter().any(|s| s.starts_with(r#"DELETE FROM "role_user""#)), "{sql:?}");
        assert!(sql.iter().any(|s| s.starts_with(r#"INSERT INTO "role_user""#)), "{sql:?}");
    }

    #[tokio::test]
    async fn test_sync_needs_saved_parent() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let orm = orm(conn);
        let unsaved = Record::new(orm.meta("User").unwrap());
        let err = orm
            .relation(&unsaved, "roles")
            .unwrap()
            .sync(vec![json!(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidRelation(_)));
    }
}
