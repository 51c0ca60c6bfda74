//! # Quarry DB
//!
//! Database layer of the Quarry web framework.
//!
//! - [`backends`]: sqlx-backed connections returning ordered rows
//! - [`composer`]: the chainable query composer and its SQL adapter
//!
//! ## Example
//!
//! ```no_run
//! use quarry_db::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = DatabaseConnection::connect_sqlite("sqlite::memory:").await?;
//! let db = Database::new(connection);
//! # let _ = db;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod composer;

pub use backends::{DatabaseBackend, DatabaseConnection, DatabaseError, DatabaseType, QueryValue, Row};
pub use composer::{Composer, ComposerError, Database};

pub mod prelude {
	pub use crate::backends::{DatabaseConnection, DatabaseError, DatabaseType, QueryValue, Row};
	pub use crate::composer::{
		AggregateExpr, ColumnRequest, ColumnType, Composer, ComposerError, ComposerRecord, Database,
		Direction, FilterObject, FilterValue, Model, ModelSchema, QueryOutcome, TransformSpec,
	};
}
