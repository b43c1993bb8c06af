//! Relation definitions, lazy relation handles and pivot management.

mod def;
mod handle;
mod pivot;

pub use def::{PivotDef, RelationDef};
pub use handle::Relation;
pub(crate) use handle::associate_record;
pub use pivot::SyncChanges;
