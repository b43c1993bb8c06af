//! # Quarry Demo
//!
//! Migrates and seeds a database, then walks through queries, eager
//! loading, aggregates, pivot updates and resource rendering.

use anyhow::Context;
use serde_json::json;

use migration::{Migrator, MigratorTrait};
use quarry_core::{Attributes, JsonValue};
use quarry_orm::testing::Seeder;
use quarry_orm::{DatabaseConnections, Direction, ModelEvent, Orm};
use quarry_resources::{ApiResponse, ErrorResponse, Resource, ResourceCollection};

mod config;
mod factories;
mod models;
mod resources;
mod seeders;
mod telemetry;

use config::AppConfig;
use models::{Comment, Post, Role, User};
use resources::{PostResource, UserResource, post_summaries};
use telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();
    let database = config
        .database
        .clone()
        .context("DATABASE_URL must be set to run the demo")?;

    let connections = DatabaseConnections::init(&database).await?;
    if config.migrate {
        Migrator::up(&connections.main, None)
            .await
            .context("running migrations")?;
    }

    let orm = Orm::builder(connections)
        .register::<User>()
        .register::<Post>()
        .register::<Role>()
        .register::<Comment>()
        .listen("Post", ModelEvent::Deleted, |post| {
            tracing::info!(post_id = ?post.key(), "Post moved to trash");
            Ok(())
        })
        .listen_any(|event, record| {
            tracing::trace!(event, exists = record.exists(), "Model event");
            Ok(())
        })
        .build()?;

    if config.seed && orm.query("User")?.doesnt_exist().await? {
        seeders::database_seeder(10).run(&orm).await?;
    }

    walkthrough(&orm, &config).await
}

fn print(label: &str, value: &JsonValue) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("== {label}\n{text}\n"),
        Err(e) => tracing::warn!(error = %e, "Could not render {label}"),
    }
}

fn attributes(value: JsonValue) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

async fn walkthrough(orm: &Orm, config: &AppConfig) -> anyhow::Result<()> {
    // Paginated users with their posts and roles
    let page = orm
        .query("User")?
        .with_("posts")
        .with_("roles")
        .order_by("id")
        .paginate(1, config.per_page)
        .await?
        .with_path(format!("{}/users", config.api_path));
    let users = ResourceCollection::from_paginator(&UserResource, page)?;
    print("users", &json!(ApiResponse::ok(users)));

    // Popular published posts, nested user and comments
    let popular = orm
        .query("Post")?
        .scope("published")
        .scope_with("popular", &[json!(1000)])
        .with_("user")
        .with_("comments")
        .order_by_desc("views")
        .take(5)
        .get()
        .await?;
    let total_views: i64 = popular
        .iter()
        .filter_map(|p| p.attribute("views").ok()?.as_i64())
        .sum();
    let rendered = PostResource
        .collection(popular)
        .additional(attributes(json!({"total_views": total_views})))
        .to_json()?;
    print("popular posts", &rendered);

    // Grouped report
    let report = orm
        .aggregate("Post")?
        .group_by(["status"])
        .count("*")
        .sum("views")
        .avg("rating")
        .having("count", ">", 0)
        .order_by("sum_views", Direction::Desc)
        .get()
        .await?;
    print("posts by status", &json!(report));

    let writers = orm
        .query("User")?
        .where_has_constrained("posts", |q| q.where_eq("status", "published"))
        .count()
        .await?;
    let silent = orm.query("User")?.where_doesnt_have("posts").count().await?;
    print("authors", &json!({"published": writers, "without_posts": silent}));

    // Keyset pages
    let first = orm
        .query("Post")?
        .cursor_paginate("id", 3, None, None)
        .await?;
    let next = first.next_cursor().map(|c| json!(c.parse::<i64>().unwrap_or_default()));
    print(
        "post summaries",
        &ResourceCollection::from_cursor_paginator(&post_summaries(), first)?,
    );
    if let Some(after) = next {
        let second = orm
            .query("Post")?
            .cursor_paginate("id", 3, Some(after), None)
            .await?;
        print(
            "post summaries (next)",
            &ResourceCollection::from_cursor_paginator(&post_summaries(), second)?,
        );
    }

    // Pivot updates
    if let Some(user) = orm.query("User")?.first().await? {
        let roles = orm.relation(&user, "roles")?;
        let editor = orm.query("Role")?.where_eq("name", "editor").value("id").await?;
        if let Some(editor) = editor {
            let changes = roles.toggle(vec![editor.clone()]).await?;
            print("toggled editor", &json!(changes));
            roles
                .update_existing_pivot(editor, attributes(json!({"expires_at": null})))
                .await?;
        }
        print("current roles", &json!(roles.current_pivot_ids().await?));
    }

    // Soft delete round trip
    if let Some(mut post) = orm.query("Post")?.latest().first().await? {
        orm.delete(&mut post).await?;
        let trashed = orm.query("Post")?.only_trashed().count().await?;
        orm.restore(&mut post).await?;
        let visible = orm.query("Post")?.count().await?;
        print("soft deletes", &json!({"trashed": trashed, "visible_after_restore": visible}));
    }

    // Errors as problem details
    if let Err(err) = orm.query("User")?.find_or_fail(0).await {
        print("missing user", &json!(ErrorResponse::from(&err)));
    }
    if let Err(err) = orm
        .create("User", attributes(json!({"name": "", "email": "not-an-email"})))
        .await
    {
        print("invalid user", &json!(ErrorResponse::from(err)));
    }

    Ok(())
}
