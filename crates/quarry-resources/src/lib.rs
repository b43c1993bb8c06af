//! # Quarry Resources
//!
//! Turns records into API payloads.
//! A [`Resource`] describes the public shape of one model, a
//! [`ResourceCollection`] wraps many records with `data` / `meta` envelopes
//! and pagination, and [`ErrorResponse`] renders ORM errors as RFC 7807
//! problem details.

pub mod collection;
pub mod fields;
pub mod resource;
pub mod response;
pub mod schema;

pub use collection::ResourceCollection;
pub use fields::Fields;
pub use resource::{RecordResource, Resource};
pub use response::{ApiResponse, ErrorResponse};
pub use schema::SchemaResource;
