//! # Quarry Core
//!
//! The database-independent layer of the Quarry ORM.
//! This crate contains filters, casts, validation rules, paginators and
//! naming helpers. Nothing here talks to a database.

pub mod cast;
pub mod error;
pub mod filter;
pub mod naming;
pub mod pagination;
pub mod validation;
pub mod value;

pub use cast::{Cast, CastRegistry, DbType};
pub use error::{OrmError, OrmResult, ValidationErrors};
pub use filter::{Filter, FilterCondition, FilterGroup, FilterNode, LogicalOperator, Operator};
pub use pagination::{CursorPaginator, LengthAwarePaginator, Paginator};
pub use validation::{Rule, Validator};
pub use value::{Attributes, JsonValue};
