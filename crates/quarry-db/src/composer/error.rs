//! Composer errors

use crate::backends::DatabaseError;

/// Errors raised while building or running a composed query
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
	#[error("Model \"{model}\" has no relationship \"{relationship}\"")]
	UnknownRelationship { model: String, relationship: String },

	#[error("Model \"{model}\" has no column \"{column}\"")]
	UnknownColumn { model: String, column: String },

	#[error("Invalid transformation \"{alias}\": {reason}")]
	InvalidTransform { alias: String, reason: String },

	#[error("Can not call order_by on a standalone aggregate query")]
	StandaloneAggregateOrder,

	/// Execution failure, captured in the result record
	#[error("Database error: {0}")]
	Database(#[from] DatabaseError),

	#[error("Failed to hydrate {model}: {source}")]
	Hydration {
		model: String,
		#[source]
		source: DatabaseError,
	},
}

pub type Result<T> = std::result::Result<T, ComposerError>;
