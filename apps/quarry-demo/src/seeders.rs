//! Demo data.

use async_trait::async_trait;
use serde_json::json;

use quarry_core::{Attributes, OrmResult};
use quarry_orm::Orm;
use quarry_orm::testing::{DatabaseSeeder, Seeder, fake};

use crate::factories;

pub struct RoleSeeder;

#[async_trait]
impl Seeder for RoleSeeder {
    fn name(&self) -> &str {
        "RoleSeeder"
    }

    async fn run(&self, orm: &Orm) -> OrmResult<()> {
        for name in ["admin", "editor", "reader"] {
            let exists = orm.query("Role")?.where_eq("name", name).exists().await?;
            if !exists {
                orm.create("Role", attributes(json!({"name": name}))).await?;
            }
        }
        Ok(())
    }
}

/// Users with posts, comments and roles.
pub struct UserSeeder {
    pub users: usize,
    pub posts_per_user: usize,
}

#[async_trait]
impl Seeder for UserSeeder {
    fn name(&self) -> &str {
        "UserSeeder"
    }

    async fn run(&self, orm: &Orm) -> OrmResult<()> {
        let roles = orm.query("Role")?.pluck("id").await?;
        let mut users = factories::admins().create_many(orm, 1, Attributes::new()).await?;
        users.extend(
            factories::users()
                .create_many(orm, self.users.saturating_sub(1), Attributes::new())
                .await?,
        );

        let post_factory = factories::posts();
        let comment_factory = factories::comments();
        for user in &users {
            let posts = orm.relation(user, "posts")?;
            for _ in 0..self.posts_per_user {
                let mut post = post_factory.make(orm, Attributes::new())?;
                posts.save(&mut post).await?;

                let comments = orm.relation(&post, "comments")?;
                for _ in 0..fake::int_between(0, 3) {
                    let mut comment = comment_factory.make(orm, Attributes::new())?;
                    comments.save(&mut comment).await?;
                }
            }

            if let Some(role) = fake::pick(&roles) {
                orm.relation(user, "roles")?.sync_without_detaching(vec![role]).await?;
            }
        }
        Ok(())
    }
}

pub fn database_seeder(users: usize) -> DatabaseSeeder {
    DatabaseSeeder::new().add(RoleSeeder).add(UserSeeder {
        users,
        posts_per_user: 3,
    })
}

fn attributes(value: serde_json::Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use quarry_orm::DatabaseConnections;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};

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

    use crate::models::{Comment, Post, Role, User};

    type Row = BTreeMap<&'static str, Value>;

    fn found() -> Vec<Row> {
        vec![BTreeMap::from([("exists", Value::from(1i32))])]
    }

    #[test]
    fn test_seeders_run_in_order() {
        let seeder = database_seeder(5);
        assert_eq!(seeder.len(), 2);
    }

    #[tokio::test]
    async fn test_role_seeder_creates_only_missing_roles() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([found()])
            .append_query_results([Vec::<Row>::new()])
            .append_query_results([vec![BTreeMap::from([
                ("id", Value::from(2i64)),
                ("name", Value::from("editor")),
            ])]])
            .append_query_results([found()])
            .into_connection();
        let orm = Orm::builder(DatabaseConnections::from_connection(share(&conn)))
            .register::<User>()
            .register::<Post>()
            .register::<Role>()
            .register::<Comment>()
            .build()
            .unwrap();

        RoleSeeder.run(&orm).await.unwrap();

        let sql: Vec<String> = conn
            .into_transaction_log()
            .iter()
            .flat_map(|txn| txn.statements().iter().map(|stmt| stmt.sql.clone()))
            .collect();
        assert_eq!(sql.len(), 4, "{sql:?}");
        let inserts: Vec<_> = sql.iter().filter(|s| s.starts_with("INSERT")).collect();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].starts_with(r#"INSERT INTO "roles""#), "{}", inserts[0]);
        assert!(sql[2].starts_with("INSERT"), "{}", sql[2]);
    }
}
