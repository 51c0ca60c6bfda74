//! Model schemas
//!
//! A [`ModelSchema`] is the typed registry the composer resolves every column
//! and relationship name against. Schemas are built once, bottom-up (a
//! relationship holds the target's `Arc<ModelSchema>`), and shared read-only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::aggregate::AggregateExpr;
use crate::backends::{DatabaseError, QueryValue, Row};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
	Serial,
	Int,
	Currency,
	Float,
	String,
	Text,
	Datetime,
	Boolean,
	Json,
}

impl ColumnType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ColumnType::Serial => "serial",
			ColumnType::Int => "int",
			ColumnType::Currency => "currency",
			ColumnType::Float => "float",
			ColumnType::String => "string",
			ColumnType::Text => "text",
			ColumnType::Datetime => "datetime",
			ColumnType::Boolean => "boolean",
			ColumnType::Json => "json",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
	pub name: String,
	pub column_type: ColumnType,
}

/// A belongs-to relationship: `via` on this model references `id` on `target`
#[derive(Debug, Clone)]
pub struct Relationship {
	pub name: String,
	pub target: Arc<ModelSchema>,
	pub via: String,
}

impl Relationship {
	pub fn table(&self) -> &str {
		self.target.table()
	}
}

#[derive(Debug)]
pub struct ModelSchema {
	name: String,
	table: String,
	columns: Vec<ColumnDef>,
	relationships: IndexMap<String, Relationship>,
	aggregate_by: IndexMap<String, AggregateExpr>,
	external_interface: Vec<String>,
}

impl ModelSchema {
	/// Start building a schema
	///
	/// # Examples
	///
	/// ```
	/// use quarry_db::composer::{AggregateExpr, ColumnType, ModelSchema};
	///
	/// let user = ModelSchema::builder("User", "users")
	///     .column("id", ColumnType::Serial)
	///     .column("name", ColumnType::String)
	///     .build();
	///
	/// let post = ModelSchema::builder("Post", "posts")
	///     .column("id", ColumnType::Serial)
	///     .column("user_id", ColumnType::Int)
	///     .column("views", ColumnType::Int)
	///     .belongs_to("user", user.clone(), "user_id")
	///     .aggregate("views", AggregateExpr::Sum)
	///     .build();
	///
	/// assert_eq!(post.relationship("user").unwrap().table(), "users");
	/// assert_eq!(post.aggregate_for("views"), Some(&AggregateExpr::Sum));
	/// ```
	pub fn builder(name: impl Into<String>, table: impl Into<String>) -> ModelSchemaBuilder {
		ModelSchemaBuilder {
			schema: ModelSchema {
				name: name.into(),
				table: table.into(),
				columns: Vec::new(),
				relationships: IndexMap::new(),
				aggregate_by: IndexMap::new(),
				external_interface: Vec::new(),
			},
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn columns(&self) -> &[ColumnDef] {
		&self.columns
	}

	pub fn column(&self, name: &str) -> Option<&ColumnDef> {
		self.columns.iter().find(|c| c.name == name)
	}

	pub fn has_column(&self, name: &str) -> bool {
		self.column(name).is_some()
	}

	pub fn relationship(&self, name: &str) -> Option<&Relationship> {
		self.relationships.get(name)
	}

	pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
		self.relationships.values()
	}

	pub fn aggregate_for(&self, column: &str) -> Option<&AggregateExpr> {
		self.aggregate_by.get(column)
	}

	/// Columns safe to expose externally; every column when none were declared
	pub fn external_interface(&self) -> Vec<String> {
		if self.external_interface.is_empty() {
			self.columns.iter().map(|c| c.name.clone()).collect()
		} else {
			self.external_interface.clone()
		}
	}
}

pub struct ModelSchemaBuilder {
	schema: ModelSchema,
}

impl ModelSchemaBuilder {
	pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
		self.schema.columns.push(ColumnDef {
			name: name.into(),
			column_type,
		});
		self
	}

	pub fn belongs_to(
		mut self,
		name: impl Into<String>,
		target: Arc<ModelSchema>,
		via: impl Into<String>,
	) -> Self {
		let name = name.into();
		self.schema.relationships.insert(
			name.clone(),
			Relationship {
				name,
				target,
				via: via.into(),
			},
		);
		self
	}

	pub fn aggregate(mut self, column: impl Into<String>, expr: AggregateExpr) -> Self {
		self.schema.aggregate_by.insert(column.into(), expr);
		self
	}

	pub fn external_interface<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.schema.external_interface = columns.into_iter().map(Into::into).collect();
		self
	}

	pub fn build(self) -> Arc<ModelSchema> {
		Arc::new(self.schema)
	}
}

/// A model the composer can query and hydrate
pub trait Model: Sized + Send + Sync + 'static {
	fn schema() -> Arc<ModelSchema>;

	/// Build an instance from a fetched row. `persisted` is true for rows
	/// loaded from storage.
	fn from_row(row: &Row, persisted: bool) -> Result<Self, DatabaseError>;

	/// Primary key, used when the model is passed as a relationship filter
	fn id(&self) -> Option<QueryValue>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schema() -> Arc<ModelSchema> {
		let user = ModelSchema::builder("User", "users")
			.column("id", ColumnType::Serial)
			.column("email", ColumnType::String)
			.build();

		ModelSchema::builder("Post", "posts")
			.column("id", ColumnType::Serial)
			.column("user_id", ColumnType::Int)
			.column("title", ColumnType::String)
			.belongs_to("user", user, "user_id")
			.aggregate("id", AggregateExpr::Count)
			.external_interface(["id", "title"])
			.build()
	}

	#[test]
	fn test_lookups() {
		let post = schema();

		assert_eq!(post.table(), "posts");
		assert_eq!(
			post.column("title").map(|c| c.column_type),
			Some(ColumnType::String)
		);
		assert!(post.column("missing").is_none());
		assert_eq!(post.relationship("user").map(|r| r.via.as_str()), Some("user_id"));
		assert!(post.relationship("author").is_none());
		assert_eq!(post.aggregate_for("id"), Some(&AggregateExpr::Count));
		assert_eq!(post.aggregate_for("title"), None);
	}

	#[test]
	fn test_external_interface_defaults_to_all_columns() {
		let post = schema();
		assert_eq!(post.external_interface(), vec!["id", "title"]);

		let user = post.relationship("user").unwrap().target.clone();
		assert_eq!(user.external_interface(), vec!["id", "email"]);
	}

	#[test]
	fn test_column_type_names() {
		assert_eq!(ColumnType::Datetime.as_str(), "datetime");
		assert_eq!(
			serde_json::to_string(&ColumnType::Currency).unwrap(),
			"\"currency\""
		);
	}
}
