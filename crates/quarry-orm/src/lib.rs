//! # Quarry ORM
//!
//! ActiveRecord-style models on top of SeaORM: a fluent query builder,
//! relations with batched eager loading, lifecycle events, soft deletes and
//! pivot management.
//!
//! ## Feature Flags
//!
//! - `postgres` (default) - PostgreSQL via SeaORM's sqlx driver
//! - `sqlite` - SQLite support
//! - `mysql` - MySQL support
//!
//! ## Example
//! ```no_run
//! use quarry_orm::{DatabaseConfig, DatabaseConnections, ModelDef, Orm};
//!
//! # async fn run() -> quarry_core::OrmResult<()> {
//! let config = DatabaseConfig::new("postgres://localhost/app");
//! let orm = Orm::builder(DatabaseConnections::init(&config).await?)
//!     .model(ModelDef::new("User").soft_deletes().has_many("posts", "Post"))
//!     .model(ModelDef::new("Post").belongs_to("user", "User"))
//!     .build()?;
//!
//! let active = orm
//!     .query("User")?
//!     .where_eq("active", true)
//!     .with_("posts")
//!     .paginate(1, 20)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod events;
pub mod model;
pub mod orm;
pub mod query;
pub mod relations;
pub mod testing;

pub use database::{DatabaseConfig, DatabaseConnections, SecondaryDbConfig};
pub use events::{EventDispatcher, ModelEvent, Observer};
pub use model::{LoadedRelation, Model, ModelDef, ModelMeta, Record};
pub use orm::{Orm, OrmBuilder};
pub use query::{AggregateBuilder, Direction, QueryBuilder, Scope, TrashedMode, scope_fn};
pub use relations::{PivotDef, Relation, RelationDef, SyncChanges};
