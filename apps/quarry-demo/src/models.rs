//! Demo model definitions.

use quarry_core::JsonValue;
use quarry_core::validation::{Email, In, MaxLength, MinLength, Required};
use quarry_orm::{Model, ModelDef, ModelEvent, PivotDef, RelationDef};

pub struct User;

impl Model for User {
    fn definition() -> ModelDef {
        ModelDef::new("User")
            .fillable(["name", "email", "password", "settings", "bio"])
            .hidden(["password"])
            .cast("is_admin", "bool")
            .cast("settings", "json")
            .rule("name", Required)
            .rule("email", Required)
            .rule("email", Email)
            .rule("password", MinLength(8))
            .soft_deletes()
            .has_many("posts", "Post")
            .relation(
                "roles",
                RelationDef::belongs_to_many(PivotDef::infer("User", "id", "Role"))
                    .with_pivot(["expires_at"])
                    .with_pivot_timestamps(),
            )
            .morph_many("comments", "Comment", "commentable")
            .scope("admins", |query| query.where_eq("is_admin", true))
            .on(ModelEvent::Saving, |user| {
                if let Some(JsonValue::String(email)) = user.get("email") {
                    let email = email.trim().to_lowercase();
                    user.set_raw("email", email);
                }
                Ok(())
            })
    }
}

pub struct Post;

impl Model for Post {
    fn definition() -> ModelDef {
        ModelDef::new("Post")
            .fillable(["title", "slug", "body", "status", "views", "rating", "published_at"])
            .cast("views", "int")
            .cast("rating", "float")
            .cast("published_at", "datetime")
            .rule("title", Required)
            .rule("title", MaxLength(255))
            .rule("status", In::new(["draft", "published"]))
            .soft_deletes()
            .belongs_to("user", "User")
            .morph_many("comments", "Comment", "commentable")
            .scope("published", |query| query.where_eq("status", "published"))
            .scope_with("popular", |query, args| {
                let min = args.first().and_then(JsonValue::as_i64).unwrap_or(100);
                query.where_("views", ">=", min)
            })
    }
}

pub struct Role;

impl Model for Role {
    fn definition() -> ModelDef {
        ModelDef::new("Role")
            .fillable(["name"])
            .rule("name", Required)
            .belongs_to_many("users", "User")
    }
}

pub struct Comment;

impl Model for Comment {
    fn definition() -> ModelDef {
        ModelDef::new("Comment")
            .fillable(["body", "approved"])
            .cast("approved", "bool")
            .rule("body", Required)
            .morph_to("commentable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::CastRegistry;

    #[test]
    fn test_definitions_resolve() {
        let casts = CastRegistry::with_defaults();
        for def in [User::definition(), Post::definition(), Role::definition(), Comment::definition()] {
            let name = def.name().to_string();
            assert!(def.into_meta(&casts).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_roles_share_one_pivot_table() {
        let user = User::definition().into_meta(&CastRegistry::with_defaults()).unwrap();
        let role = Role::definition().into_meta(&CastRegistry::with_defaults()).unwrap();
        let table = |def: &RelationDef| match def {
            RelationDef::BelongsToMany(pivot) => pivot.table.clone(),
            _ => String::new(),
        };
        assert_eq!(table(user.relation("roles").unwrap()), "role_user");
        assert_eq!(table(role.relation("users").unwrap()), "role_user");
    }
}
