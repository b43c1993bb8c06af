//! Record factories for the demo models.

use quarry_core::Attributes;
use quarry_orm::testing::{Factory, fake};
use serde_json::json;

fn attributes(value: serde_json::Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

pub fn users() -> Factory {
    Factory::new("User", |n| {
        attributes(json!({
            "name": fake::name(),
            "email": format!("user{n}@example.com"),
            "password": fake::password(16),
            "is_admin": false,
            "settings": {"theme": fake::pick(&["light", "dark"]).unwrap_or_default()},
        }))
    })
}

pub fn admins() -> Factory {
    users().state(attributes(json!({"is_admin": true})))
}

pub fn posts() -> Factory {
    Factory::new("Post", |n| {
        let published = fake::boolean();
        attributes(json!({
            "title": fake::sentence(4),
            "slug": format!("{}-{n}", fake::slug(3)),
            "body": fake::paragraph(3),
            "status": if published { "published" } else { "draft" },
            "views": fake::int_between(0, 5000),
            "rating": (fake::float_between(1.0, 5.0) * 100.0).round() / 100.0,
            "published_at": published.then(|| fake::past_datetime(90).to_rfc3339()),
        }))
    })
}

pub fn comments() -> Factory {
    Factory::new("Comment", |_| {
        attributes(json!({
            "body": fake::sentence(8),
            "approved": fake::boolean(),
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_admin_state_overrides_definition() {
        let raw = admins().raw(Attributes::new());
        assert_eq!(raw.get("is_admin"), Some(&json!(true)));
        assert!(raw.get("email").and_then(|e| e.as_str()).is_some_and(|e| e.ends_with("@example.com")));
    }

    #[test]
    fn test_post_status_matches_publication() {
        let factory = posts();
        for _ in 0..10 {
            let raw = factory.raw(Attributes::new());
            let published = raw["status"] == json!("published");
            assert_eq!(published, !raw["published_at"].is_null());
        }
    }
}
