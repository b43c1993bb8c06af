//! Fluent query building, aggregate reports, scopes and eager loading.

mod aggregate;
mod builder;
mod clause;
pub(crate) mod eager;
mod scope;

pub use aggregate::{AggregateBuilder, AggregateFn};
pub use builder::{Constraint, QueryBuilder, TrashedMode};
pub use clause::{Boolean, Direction};
pub use scope::{FnScope, Scope, scope_fn};
