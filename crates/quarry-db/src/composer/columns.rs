//! Column references and projection resolution

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::schema::{ColumnDef, ColumnType, ModelSchema};
use super::transform::Transformation;

/// A resolved reference to something a statement can select, order or group by
#[derive(Clone)]
pub enum ColumnRef {
	/// Column of the base model
	Native(String),
	/// Column of a related model, reached through a joined relationship
	Related {
		relationship: String,
		column: String,
	},
	Transformation(Arc<Transformation>),
}

impl ColumnRef {
	/// Output column name this reference selects under
	pub fn key(&self) -> String {
		match self {
			ColumnRef::Native(name) => name.clone(),
			ColumnRef::Related {
				relationship,
				column,
			} => joined_alias(relationship, column),
			ColumnRef::Transformation(t) => t.alias().to_string(),
		}
	}
}

impl fmt::Debug for ColumnRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ColumnRef::Native(name) => write!(f, "Native({})", name),
			ColumnRef::Related {
				relationship,
				column,
			} => write!(f, "Related({}.{})", relationship, column),
			ColumnRef::Transformation(t) => write!(f, "Transformation({})", t.alias()),
		}
	}
}

impl PartialEq for ColumnRef {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(ColumnRef::Native(a), ColumnRef::Native(b)) => a == b,
			(
				ColumnRef::Related {
					relationship: ra,
					column: ca,
				},
				ColumnRef::Related {
					relationship: rb,
					column: cb,
				},
			) => ra == rb && ca == cb,
			(ColumnRef::Transformation(a), ColumnRef::Transformation(b)) => a.alias() == b.alias(),
			_ => false,
		}
	}
}

/// `relationship$column`
pub fn joined_alias(relationship: &str, column: &str) -> String {
	format!("{}${}", relationship, column)
}

/// LEFT JOIN of a relationship's table, aliased by the relationship name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
	pub relationship: String,
	pub table: String,
	/// Column on the joined table, always `id`
	pub field: String,
	/// Foreign key on the base table
	pub base_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedColumn {
	pub table: String,
	pub relationship: String,
	pub alias: String,
	pub column: String,
	pub column_type: ColumnType,
}

/// A projection request as passed to `interface()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRequest {
	/// Native column or transformation alias
	Column(String),
	/// Joined columns of one relationship
	Relationship {
		name: String,
		columns: Vec<String>,
	},
}

impl ColumnRequest {
	pub fn relationship<I, S>(name: impl Into<String>, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		ColumnRequest::Relationship {
			name: name.into(),
			columns: columns.into_iter().map(Into::into).collect(),
		}
	}
}

impl From<&str> for ColumnRequest {
	fn from(name: &str) -> Self {
		ColumnRequest::Column(name.to_string())
	}
}

impl From<String> for ColumnRequest {
	fn from(name: String) -> Self {
		ColumnRequest::Column(name)
	}
}

/// One output column of a statement
#[derive(Debug, Clone)]
pub enum ProjectedColumn {
	Native(ColumnDef),
	Joined(JoinedColumn),
	Transformation(Arc<Transformation>),
}

impl ProjectedColumn {
	pub fn key(&self) -> &str {
		match self {
			ProjectedColumn::Native(def) => &def.name,
			ProjectedColumn::Joined(joined) => &joined.alias,
			ProjectedColumn::Transformation(t) => t.alias(),
		}
	}

	pub fn column_type(&self) -> ColumnType {
		match self {
			ProjectedColumn::Native(def) => def.column_type,
			ProjectedColumn::Joined(joined) => joined.column_type,
			ProjectedColumn::Transformation(t) => t.result_type(),
		}
	}

	/// Names this column occupies in a fetched row
	pub fn output_names(&self) -> Vec<String> {
		match self {
			ProjectedColumn::Transformation(t) if t.is_post_fetch() => {
				(0..t.sources().len()).map(|i| t.hidden_column(i)).collect()
			}
			other => vec![other.key().to_string()],
		}
	}
}

/// Projection state shared by every stage of a composer chain
#[derive(Debug, Clone, Default)]
pub struct Projection {
	pub requested: Vec<ColumnRequest>,
	pub joins: Vec<Join>,
	pub joined_columns: Vec<JoinedColumn>,
	pub transformations: IndexMap<String, Arc<Transformation>>,
}

impl Projection {
	pub fn is_joined(&self, relationship: &str) -> bool {
		self.joins.iter().any(|j| j.relationship == relationship)
	}

	/// Resolve the requested columns into an ordered projection
	///
	/// Falls back to native columns, then transformations, then joined
	/// columns when nothing (valid) was requested.
	pub fn resolve(&self, schema: &ModelSchema) -> Vec<ProjectedColumn> {
		let mut seen = HashSet::new();
		let mut columns = Vec::new();

		for request in &self.requested {
			match request {
				ColumnRequest::Column(name) => {
					let column = if let Some(t) = self.transformations.get(name) {
						ProjectedColumn::Transformation(t.clone())
					} else if let Some(def) = schema.column(name) {
						ProjectedColumn::Native(def.clone())
					} else {
						continue;
					};
					if seen.insert(column.key().to_string()) {
						columns.push(column);
					}
				}
				ColumnRequest::Relationship { name, columns: wanted } => {
					for column in wanted {
						let joined = self
							.joined_columns
							.iter()
							.find(|jc| &jc.relationship == name && &jc.column == column);
						if let Some(joined) = joined {
							if seen.insert(joined.alias.clone()) {
								columns.push(ProjectedColumn::Joined(joined.clone()));
							}
						}
					}
				}
			}
		}

		if columns.is_empty() {
			columns.extend(schema.columns().iter().cloned().map(ProjectedColumn::Native));
			columns.extend(
				self.transformations
					.values()
					.cloned()
					.map(ProjectedColumn::Transformation),
			);
			columns.extend(self.joined_columns.iter().cloned().map(ProjectedColumn::Joined));
		}

		columns
	}
}

/// True when `columns` is exactly the model's native column set
pub fn is_native_shape(schema: &ModelSchema, columns: &[ProjectedColumn]) -> bool {
	let mut names = HashSet::new();
	for column in columns {
		match column {
			ProjectedColumn::Native(def) => {
				names.insert(def.name.as_str());
			}
			_ => return false,
		}
	}
	names.len() == schema.columns().len()
}
