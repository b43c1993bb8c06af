//! Page containers returned by paginated queries.
//!
//! Each paginator serializes to the `{"data": [...], "meta": {...}}` envelope
//! used by API responses; the length-aware variant adds `links` when it knows
//! its base path.

mod cursor;
mod length_aware;
mod paginator;

pub use cursor::CursorPaginator;
pub use length_aware::{LengthAwarePaginator, PageLinks};
pub use paginator::Paginator;

/// Default page size.
pub const DEFAULT_PER_PAGE: u64 = 15;
