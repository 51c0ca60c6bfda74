//! Result records
//!
//! Fetched rows are reshaped to the projection, post-fetch transformations
//! are computed, and the rows are wrapped with a description of their shape.
//! Model instances are only built when the rows have the model's own shape.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::columns::ProjectedColumn;
use super::error::{ComposerError, Result};
use super::schema::{ColumnType, Model};
use crate::backends::{QueryValue, Row};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceField {
	pub name: String,
	#[serde(rename = "type")]
	pub column_type: ColumnType,
	pub array: bool,
}

/// Shape of the rows in a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceShape {
	pub name: String,
	pub fields: Vec<ResourceField>,
}

impl ResourceShape {
	pub fn new(name: impl Into<String>, columns: &[ProjectedColumn], grouped: bool) -> Self {
		Self {
			name: name.into(),
			fields: columns
				.iter()
				.map(|column| ResourceField {
					name: column.key().to_string(),
					column_type: column.column_type(),
					array: grouped && is_array(column),
				})
				.collect(),
		}
	}

	pub fn field(&self, name: &str) -> Option<&ResourceField> {
		self.fields.iter().find(|f| f.name == name)
	}
}

/// Outcome of a composed query
#[derive(Debug, Default)]
pub struct ComposerRecord {
	/// Execution or hydration failure; `rows` is empty when set
	pub error: Option<ComposerError>,
	pub rows: Vec<Row>,
	pub resource: ResourceShape,
	/// Aggregate row fetched by `summarize`
	pub summary: Option<Row>,
}

impl ComposerRecord {
	pub(crate) fn failed(error: ComposerError, resource: ResourceShape) -> Self {
		Self {
			error: Some(error),
			rows: Vec::new(),
			resource,
			summary: None,
		}
	}

	pub fn is_ok(&self) -> bool {
		self.error.is_none()
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
}

impl Serialize for ComposerRecord {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("ComposerRecord", 4)?;
		state.serialize_field("error", &self.error.as_ref().map(ToString::to_string))?;
		state.serialize_field("rows", &self.rows)?;
		state.serialize_field("resource", &self.resource)?;
		state.serialize_field("summary", &self.summary)?;
		state.end()
	}
}

/// Record plus hydrated models, when the projection allowed them
#[derive(Debug)]
pub struct QueryOutcome<M> {
	pub record: ComposerRecord,
	pub models: Option<Vec<M>>,
}

impl<M> QueryOutcome<M> {
	pub fn is_ok(&self) -> bool {
		self.record.is_ok()
	}

	pub fn rows(&self) -> &[Row] {
		&self.record.rows
	}

	pub fn error(&self) -> Option<&ComposerError> {
		self.record.error.as_ref()
	}
}

fn is_array(column: &ProjectedColumn) -> bool {
	matches!(column, ProjectedColumn::Transformation(t) if t.is_array())
}

/// Reorder fetched rows to the projection and compute post-fetch values
///
/// SQLite returns array aggregates as JSON text; those are decoded into
/// arrays when the statement was grouped.
pub(crate) fn materialize(rows: Vec<Row>, columns: &[ProjectedColumn], grouped: bool) -> Vec<Row> {
	rows.into_iter()
		.map(|mut fetched| {
			let mut row = Row::new();
			for column in columns {
				match column {
					ProjectedColumn::Transformation(t) if t.is_post_fetch() => {
						let values: Vec<QueryValue> = (0..t.sources().len())
							.map(|i| fetched.remove(&t.hidden_column(i)).unwrap_or(QueryValue::Null))
							.collect();
						let value = t.compute(&values).unwrap_or(QueryValue::Null);
						row.insert(t.alias(), value);
					}
					other => {
						let key = other.key();
						let value = fetched.remove(key).unwrap_or(QueryValue::Null);
						let value = if grouped && is_array(other) {
							decode_array(value)
						} else {
							value
						};
						row.insert(key, value);
					}
				}
			}
			row
		})
		.collect()
}

fn decode_array(value: QueryValue) -> QueryValue {
	match value {
		QueryValue::String(text) => match serde_json::from_str::<serde_json::Value>(&text) {
			Ok(json @ serde_json::Value::Array(_)) => QueryValue::from_json(json),
			_ => QueryValue::String(text),
		},
		QueryValue::Json(json @ serde_json::Value::Array(_)) => QueryValue::from_json(json),
		other => other,
	}
}

/// Build one persisted model per row
pub(crate) fn hydrate<M: Model>(rows: &[Row]) -> Result<Vec<M>> {
	rows.iter()
		.map(|row| {
			M::from_row(row, true).map_err(|source| ComposerError::Hydration {
				model: M::schema().name().to_string(),
				source,
			})
		})
		.collect()
}
