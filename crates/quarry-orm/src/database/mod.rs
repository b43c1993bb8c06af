//! Database connection management and statement execution.

mod connections;
pub mod executor;
pub mod values;

pub use connections::{DatabaseConfig, DatabaseConnections, NamedConnection, SecondaryDbConfig};
pub use executor::db_error;
