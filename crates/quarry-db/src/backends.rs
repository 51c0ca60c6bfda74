//! Database backends
//!
//! Thin layer over sqlx pools: a [`DatabaseBackend`] runs fully rendered SQL
//! with positional parameters and returns ordered [`Row`]s.

pub mod backend;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod types;

pub use backend::DatabaseBackend;
pub use connection::DatabaseConnection;
pub use error::{DatabaseError, Result};
pub use types::{DatabaseType, QueryResult, QueryValue, Row};
