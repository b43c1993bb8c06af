//! API shapes of the demo models.

use serde::{Deserialize, Serialize};

use quarry_core::{JsonValue, OrmResult};
use quarry_orm::Record;
use quarry_resources::{Fields, Resource, SchemaResource};

pub struct UserResource;

impl Resource for UserResource {
    fn to_fields<'a>(&self, user: &'a Record) -> OrmResult<Fields<'a>> {
        let is_admin = user.attribute("is_admin")?.as_bool().unwrap_or(false);
        let post_count: &dyn Fn(&[Record]) -> JsonValue = &|posts| JsonValue::from(posts.len());

        Fields::new(user)
            .attributes(["id", "name", "email"])?
            .when("settings", is_admin, user.attribute("settings")?)
            .when_or("role", is_admin, "admin", "member")
            .when_loaded("roles", |roles| roles.to_json())?
            .relation_with_meta("posts", &PostResource, &[("count", post_count)])
    }
}

pub struct PostResource;

impl Resource for PostResource {
    fn to_fields<'a>(&self, post: &'a Record) -> OrmResult<Fields<'a>> {
        let published = post.attribute("status")? == JsonValue::from("published");
        Fields::new(post)
            .attributes(["id", "title", "slug", "status", "views"])?
            .when("published_at", published, post.attribute("published_at")?)
            .when_loaded("comments", |comments| comments.to_json())?
            .when_loaded("user", |user| user.to_json())
    }
}

/// Flat listing row.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub views: i64,
}

pub fn post_summaries() -> SchemaResource<PostSummary> {
    SchemaResource::new()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use quarry_core::{Attributes, CastRegistry};
    use quarry_orm::{LoadedRelation, Model, ModelMeta};
    use serde_json::json;

    use crate::models::{Post, User};

    fn record(meta: ModelMeta, value: JsonValue) -> Record {
        let attributes: Attributes = value.as_object().cloned().unwrap_or_default();
        Record::from_database(Arc::new(meta), attributes)
    }

    fn user(value: JsonValue) -> Record {
        record(User::definition().into_meta(&CastRegistry::with_defaults()).unwrap(), value)
    }

    fn post(value: JsonValue) -> Record {
        record(Post::definition().into_meta(&CastRegistry::with_defaults()).unwrap(), value)
    }

    #[test]
    fn test_member_shape() {
        let mut jane = user(json!({
            "id": 1, "name": "Jane", "email": "jane@example.com",
            "password": "secret", "is_admin": false, "settings": "{\"theme\":\"dark\"}"
        }));
        jane.set_relation(
            "posts",
            LoadedRelation::Many(vec![post(json!({
                "id": 4, "title": "Draft", "slug": "draft", "status": "draft", "views": "12",
                "published_at": null
            }))]),
        );

        let out = UserResource.to_json(&jane).unwrap();
        assert_eq!(out["role"], json!("member"));
        assert!(out.get("settings").is_none());
        assert!(out.get("password").is_none());
        assert!(out.get("roles").is_none());
        assert_eq!(out["posts"]["meta"]["count"], json!(1));
        assert_eq!(out["posts"]["data"][0]["views"], json!(12));
        assert!(out["posts"]["data"][0].get("published_at").is_none());
    }

    #[test]
    fn test_user_without_posts_fails() {
        let jane = user(json!({"id": 1, "name": "Jane", "email": "jane@example.com"}));
        assert!(UserResource.to_json(&jane).is_err());
    }

    #[test]
    fn test_post_summary_schema() {
        let row = post(json!({"id": 2, "title": "Hello", "views": 7, "body": "long"}));
        assert_eq!(
            post_summaries().to_json(&row).unwrap(),
            json!({"id": 2, "title": "Hello", "views": 7})
        );
    }
}
