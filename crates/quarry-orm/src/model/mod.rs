//! Model declarations, metadata and records.

mod def;
mod record;
mod registry;

pub use def::{CREATED_AT, CastSpec, DELETED_AT, LocalScope, ModelDef, ModelMeta, UPDATED_AT};
pub use record::{LoadedRelation, Record};
pub use registry::ModelRegistry;

/// A type that declares a model.
///
/// ```
/// use quarry_orm::model::{Model, ModelDef};
///
/// struct Post;
///
/// impl Model for Post {
///     fn definition() -> ModelDef {
///         ModelDef::new("Post").soft_deletes().belongs_to("author", "User")
///     }
/// }
///
/// assert_eq!(Post::definition().table_name(), "posts");
/// ```
pub trait Model {
    fn definition() -> ModelDef;
}
