//! Error types for the backends layer

/// Errors that can occur while talking to the database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
	/// Driver-level error
	#[error("Driver error: {0}")]
	Driver(#[from] sqlx::Error),

	#[error("Connection error: {0}")]
	ConnectionError(String),

	#[error("Column not found: {0}")]
	ColumnNotFound(String),

	/// A value could not be converted to the requested Rust type
	#[error("Type error: {0}")]
	TypeError(String),

	#[error("Unsupported database: {0}")]
	UnsupportedDatabase(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
