//! Batched eager loading: one `WHERE key IN (...)` query per relation and
//! nesting level, matched back onto the parents by key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;

use quarry_core::value::key_string;
use quarry_core::{JsonValue, Operator, OrmError, OrmResult};

use super::{Constraint, QueryBuilder};
use crate::model::{LoadedRelation, ModelMeta, Record};
use crate::orm::Orm;
use crate::relations::RelationDef;

/// One relation at one level, with the paths to load beneath it.
#[derive(Default)]
struct Node {
    constraint: Option<Constraint>,
    children: Vec<(String, Option<Constraint>)>,
}

/// Group paths by their first segment. A constraint belongs to the last
/// segment of its path.
fn tree(paths: Vec<(String, Option<Constraint>)>) -> BTreeMap<String, Node> {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    for (path, constraint) in paths {
        match path.split_once('.') {
            Some((head, rest)) => {
                nodes
                    .entry(head.to_string())
                    .or_default()
                    .children
                    .push((rest.to_string(), constraint));
            }
            None => {
                let node = nodes.entry(path).or_default();
                if constraint.is_some() {
                    node.constraint = constraint;
                }
            }
        }
    }
    nodes
}

/// Load `paths` onto `records`, which must all belong to one model.
pub(crate) fn load<'a>(
    orm: &'a Orm,
    records: &'a mut [Record],
    paths: Vec<(String, Option<Constraint>)>,
) -> BoxFuture<'a, OrmResult<()>> {
    Box::pin(async move {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let meta = Arc::clone(first.meta());
        for (name, node) in tree(paths) {
            let def = meta.relation(&name)?.clone();
            match &def {
                RelationDef::MorphTo {
                    type_column,
                    id_column,
                } => load_morph_to(orm, records, &name, type_column, id_column, node).await?,
                _ => load_relation(orm, &meta, records, &name, &def, node).await?,
            }
        }
        Ok(())
    })
}

/// Parent column holding the key, and the related column it is matched
/// against in the batched query.
fn link(def: &RelationDef) -> Option<(&str, String)> {
    match def {
        RelationDef::HasOne {
            foreign_key,
            local_key,
            ..
        }
        | RelationDef::HasMany {
            foreign_key,
            local_key,
            ..
        } => Some((local_key, foreign_key.clone())),
        RelationDef::BelongsTo {
            foreign_key,
            owner_key,
            ..
        } => Some((foreign_key, owner_key.clone())),
        RelationDef::MorphOne {
            id_column,
            local_key,
            ..
        }
        | RelationDef::MorphMany {
            id_column,
            local_key,
            ..
        } => Some((local_key, id_column.clone())),
        RelationDef::BelongsToMany(pivot) => Some((
            &pivot.parent_key,
            format!("{}.{}", pivot.table, pivot.foreign_pivot_key),
        )),
        RelationDef::MorphTo { .. } => None,
    }
}

/// Key of a loaded child, comparable with the parent's key.
fn child_key(def: &RelationDef, child: &Record) -> Option<String> {
    let value = match def {
        RelationDef::HasOne { foreign_key, .. } | RelationDef::HasMany { foreign_key, .. } => {
            child.get(foreign_key)
        }
        RelationDef::BelongsTo { owner_key, .. } => child.get(owner_key),
        RelationDef::MorphOne { id_column, .. } | RelationDef::MorphMany { id_column, .. } => {
            child.get(id_column)
        }
        RelationDef::BelongsToMany(pivot) => child
            .pivot()
            .and_then(|attributes| attributes.get(&pivot.foreign_pivot_key)),
        RelationDef::MorphTo { .. } => None,
    };
    value.and_then(key_string)
}

/// Distinct non-null values of `field`, in first-seen order.
fn distinct_keys<'r>(records: impl Iterator<Item = &'r Record>, field: &str) -> Vec<JsonValue> {
    let mut seen = HashSet::new();
    records
        .filter_map(|record| record.get(field))
        .filter(|value| key_string(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

fn refine(mut query: QueryBuilder, node: Node) -> QueryBuilder {
    for (path, constraint) in node.children {
        query = query.with_path(&path, constraint);
    }
    match &node.constraint {
        Some(constraint) => constraint(query),
        None => query,
    }
}

async fn load_relation(
    orm: &Orm,
    meta: &ModelMeta,
    records: &mut [Record],
    name: &str,
    def: &RelationDef,
    node: Node,
) -> OrmResult<()> {
    let Some((local, remote)) = link(def) else {
        return Ok(());
    };
    let related_name = def.related().unwrap_or_default();
    let related = orm.models().resolve(related_name)?;

    let keys = distinct_keys(records.iter(), local);
    let mut grouped: HashMap<String, Vec<Record>> = HashMap::new();
    if !keys.is_empty() {
        let mut query = QueryBuilder::new(orm.clone(), related);
        match def {
            RelationDef::BelongsToMany(pivot) => {
                query = query.join_pivot(pivot.clone());
            }
            RelationDef::MorphOne { type_column, .. } | RelationDef::MorphMany { type_column, .. } => {
                query = query.constrain(
                    type_column,
                    Operator::Equal,
                    JsonValue::from(meta.morph_name.clone()),
                );
            }
            _ => {}
        }
        let query = refine(query, node).constrain(&remote, Operator::In, JsonValue::Array(keys));

        for child in query.get().await? {
            if let Some(key) = child_key(def, &child) {
                grouped.entry(key).or_default().push(child);
            }
        }
    }

    let mut matched = 0usize;
    for record in records.iter_mut() {
        let children = record
            .get(local)
            .and_then(key_string)
            .and_then(|key| grouped.get(&key))
            .cloned()
            .unwrap_or_default();
        matched += children.len();
        let loaded = if def.is_many() {
            LoadedRelation::Many(children)
        } else {
            LoadedRelation::One(children.into_iter().next())
        };
        record.set_relation(name, loaded);
    }
    tracing::debug!(model = %meta.name, relation = name, matched, "Eager loaded relation");
    Ok(())
}

async fn load_morph_to(
    orm: &Orm,
    records: &mut [Record],
    name: &str,
    type_column: &str,
    id_column: &str,
    node: Node,
) -> OrmResult<()> {
    let mut by_type: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in records.iter() {
        if let Some(JsonValue::String(morph)) = record.get(type_column) {
            by_type.entry(morph.clone()).or_default().push(record);
        }
    }
    let batches: Vec<(String, Vec<JsonValue>)> = by_type
        .into_iter()
        .map(|(morph, parents)| (morph, distinct_keys(parents.into_iter(), id_column)))
        .filter(|(_, ids)| !ids.is_empty())
        .collect();

    let mut found: HashMap<(String, String), Record> = HashMap::new();
    for (morph, ids) in batches {
        let related = orm.models().resolve_morph(&morph).map_err(|_| {
            OrmError::MorphRelation(format!(
                "Cannot resolve morph type '{morph}' for relation '{name}'"
            ))
        })?;
        let key = related.primary_key.clone();
        let node = Node {
            constraint: node.constraint.clone(),
            children: node.children.clone(),
        };
        let query = refine(QueryBuilder::new(orm.clone(), related), node).constrain(
            &key,
            Operator::In,
            JsonValue::Array(ids),
        );
        for child in query.get().await? {
            if let Some(id) = child.get(&key).and_then(key_string) {
                found.insert((morph.clone(), id), child);
            }
        }
    }

    for record in records.iter_mut() {
        let target = match (record.get(type_column), record.get(id_column).and_then(key_string)) {
            (Some(JsonValue::String(morph)), Some(id)) => found.get(&(morph.clone(), id)).cloned(),
            _ => None,
        };
        record.set_relation(name, LoadedRelation::One(target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Value};

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
    use crate::model::ModelDef;

    fn orm(conn: DatabaseConnection) -> Orm {
        Orm::builder(DatabaseConnections::from_connection(conn))
            .model(ModelDef::new("User").has_many("posts", "Post"))
            .model(
                ModelDef::new("Post")
                    .has_many("comments", "Comment")
                    .morph_many("notes", "Comment", "commentable"),
            )
            .model(ModelDef::new("Comment").morph_to("commentable"))
            .build()
            .unwrap()
    }

    fn row(pairs: &[(&'static str, Value)]) -> BTreeMap<&'static str, Value> {
        pairs.iter().cloned().collect()
    }

    fn statements(conn: DatabaseConnection) -> Vec<String> {
        conn.into_transaction_log()
            .iter()
            .flat_map(|txn| txn.statements().iter().map(|stmt| stmt.sql.clone()))
            .collect()
    }

    #[test]
    fn test_tree_groups_by_first_segment() {
        let only_last: Constraint = Arc::new(|q: QueryBuilder| q.take(5));
        let nodes = tree(vec![
            ("posts".to_string(), None),
            ("posts.comments".to_string(), Some(only_last)),
            ("posts.tags".to_string(), None),
            ("team".to_string(), None),
        ]);
        assert_eq!(nodes.keys().collect::<Vec<_>>(), vec!["posts", "team"]);
        let posts = &nodes["posts"];
        assert!(posts.constraint.is_none());
        assert_eq!(
            posts.children.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            vec!["comments", "tags"]
        );
        assert!(posts.children[0].1.is_some());
    }

    #[test]
    fn test_link_columns() {
        let def = RelationDef::has_many("Post", "user_id", "id");
        assert_eq!(link(&def), Some(("id", "user_id".to_string())));

        let def = RelationDef::belongs_to("User", "author_id", "id");
        assert_eq!(link(&def), Some(("author_id", "id".to_string())));

        let def = RelationDef::belongs_to_many(crate::relations::PivotDef::infer("User", "id", "Role"));
        assert_eq!(link(&def), Some(("id", "role_user.user_id".to_string())));

        assert!(link(&RelationDef::morph_to("commentable")).is_none());
    }

    #[tokio::test]
    async fn test_nested_paths_batch_one_query_per_level() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(&[("id", Value::from(1i64))]),
                row(&[("id", Value::from(2i64))]),
            ]])
            .append_query_results([vec![
                row(&[("id", Value::from(10i64)), ("user_id", Value::from(1i64))]),
                row(&[("id", Value::from(11i64)), ("user_id", Value::from(2i64))]),
            ]])
            .append_query_results([vec![
                row(&[("id", Value::from(100i64)), ("post_id", Value::from(11i64))]),
                row(&[("id", Value::from(101i64)), ("post_id", Value::from(11i64))]),
            ]])
            .into_connection();
        let orm = orm(share(&conn));

        let users = orm
            .query("User")
            .unwrap()
            .with_("posts.comments")
            .get()
            .await
            .unwrap();

        let first_posts = users[0].many("posts").unwrap();
        assert_eq!(first_posts.len(), 1);
        assert!(first_posts[0].many("comments").unwrap().is_empty());
        let second_posts = users[1].many("posts").unwrap();
        assert_eq!(second_posts[0].many("comments").unwrap().len(), 2);

        let sql = statements(conn);
        assert_eq!(sql.len(), 3, "{sql:?}");
        assert!(sql[1].contains(r#""posts"."user_id" IN ("#), "{}", sql[1]);
        assert!(sql[2].contains(r#""comments"."post_id" IN ("#), "{}", sql[2]);
    }

    #[tokio::test]
    async fn test_morph_to_groups_parents_by_type() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(&[
                    ("id", Value::from(1i64)),
                    ("commentable_type", Value::from("Post")),
                    ("commentable_id", Value::from(10i64)),
                ]),
                row(&[
                    ("id", Value::from(2i64)),
                    ("commentable_type", Value::from("User")),
                    ("commentable_id", Value::from(5i64)),
                ]),
                row(&[
                    ("id", Value::from(3i64)),
                    ("commentable_type", Value::from("Post")),
                    ("commentable_id", Value::from(10i64)),
                ]),
            ]])
            .append_query_results([vec![row(&[("id", Value::from(10i64))])]])
            .append_query_results([vec![row(&[("id", Value::from(5i64))])]])
            .into_connection();
        let orm = orm(share(&conn));

        let comments = orm
            .query("Comment")
            .unwrap()
            .with_("commentable")
            .get()
            .await
            .unwrap();

        let target = |i: usize| {
            let parent = comments[i].one("commentable").unwrap().unwrap();
            (parent.model_name().to_string(), parent.key().cloned())
        };
        assert_eq!(target(0), ("Post".to_string(), Some(json!(10))));
        assert_eq!(target(1), ("User".to_string(), Some(json!(5))));
        assert_eq!(target(2), ("Post".to_string(), Some(json!(10))));

        let sql = statements(conn);
        assert_eq!(sql.len(), 3, "{sql:?}");
        assert!(sql[1].contains(r#"FROM "posts""#), "{}", sql[1]);
        assert!(sql[2].contains(r#"FROM "users""#), "{}", sql[2]);
    }

    #[tokio::test]
    async fn test_morph_many_filters_on_type() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(&[("id", Value::from(10i64))])]])
            .append_query_results([vec![row(&[
                ("id", Value::from(1i64)),
                ("commentable_type", Value::from("Post")),
                ("commentable_id", Value::from(10i64)),
            ])]])
            .into_connection();
        let orm = orm(share(&conn));

        let posts = orm.query("Post").unwrap().with_("notes").get().await.unwrap();

        assert_eq!(posts[0].many("notes").unwrap().len(), 1);
        let sql = statements(conn);
        assert!(sql[1].contains(r#""comments"."commentable_type" = "#), "{}", sql[1]);
    }

    #[tokio::test]
    async fn test_constraint_limit_applies_to_whole_batch() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(&[("id", Value::from(1i64))]),
                row(&[("id", Value::from(2i64))]),
            ]])
            .append_query_results([vec![row(&[
                ("id", Value::from(10i64)),
                ("user_id", Value::from(1i64)),
            ])]])
            .into_connection();
        let orm = orm(share(&conn));

        let users = orm
            .query("User")
            .unwrap()
            .with_constrained("posts", |q| q.latest().take(1))
            .get()
            .await
            .unwrap();

        assert_eq!(users[0].many("posts").unwrap().len(), 1);
        assert!(users[1].many("posts").unwrap().is_empty());

        let sql = statements(conn);
        assert_eq!(sql.len(), 2, "{sql:?}");
        assert!(sql[1].contains(r#""posts"."user_id" IN ($1, $2)"#), "{}", sql[1]);
        assert_eq!(sql[1].matches("LIMIT").count(), 1, "{}", sql[1]);
    }
}
