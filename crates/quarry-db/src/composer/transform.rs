//! Computed output columns
//!
//! A transformation derives one output column from explicitly declared source
//! columns. SQL transformations are rendered into the statement; value
//! transformations run after the fetch over hidden source columns.

use std::fmt;
use std::sync::Arc;

use super::aggregate::SqlFormat;
use super::columns::ColumnRef;
use super::schema::ColumnType;
use crate::backends::QueryValue;

type ValueFn = dyn Fn(&[QueryValue]) -> QueryValue + Send + Sync;

/// Post-fetch transform over source column values
#[derive(Clone)]
pub struct ValueTransform(Arc<ValueFn>);

impl ValueTransform {
	pub fn apply(&self, values: &[QueryValue]) -> QueryValue {
		(self.0)(values)
	}
}

impl fmt::Debug for ValueTransform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("ValueTransform(..)")
	}
}

#[derive(Debug, Clone)]
pub enum TransformKind {
	Sql(SqlFormat),
	Value(ValueTransform),
}

/// User-facing declaration of a transformation
///
/// # Examples
///
/// ```
/// use quarry_db::composer::{ColumnType, TransformSpec};
///
/// let spec = TransformSpec::sql("author_name", ["user__name"], |cols| {
///     format!("UPPER({})", cols[0])
/// })
/// .result_type(ColumnType::String);
///
/// assert_eq!(spec.alias(), "author_name");
/// ```
#[derive(Debug, Clone)]
pub struct TransformSpec {
	pub(crate) alias: String,
	pub(crate) columns: Vec<String>,
	pub(crate) kind: TransformKind,
	pub(crate) result_type: Option<ColumnType>,
	pub(crate) is_array: bool,
	pub(crate) use_aggregate: bool,
}

impl TransformSpec {
	/// Transformation rendered into SQL. `f` receives the source column
	/// expressions in declaration order.
	pub fn sql<I, S, F>(alias: impl Into<String>, columns: I, f: F) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
		F: Fn(&[String]) -> String + Send + Sync + 'static,
	{
		Self::with_kind(alias, columns, TransformKind::Sql(SqlFormat::new(f)))
	}

	/// Transformation computed after the fetch from source column values
	pub fn value<I, S, F>(alias: impl Into<String>, columns: I, f: F) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
		F: Fn(&[QueryValue]) -> QueryValue + Send + Sync + 'static,
	{
		Self::with_kind(alias, columns, TransformKind::Value(ValueTransform(Arc::new(f))))
	}

	fn with_kind<I, S>(alias: impl Into<String>, columns: I, kind: TransformKind) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			alias: alias.into(),
			columns: columns.into_iter().map(Into::into).collect(),
			kind,
			result_type: None,
			is_array: false,
			use_aggregate: false,
		}
	}

	pub fn result_type(mut self, result_type: ColumnType) -> Self {
		self.result_type = Some(result_type);
		self
	}

	/// Collect the output into an array when the statement is grouped
	pub fn array(mut self, is_array: bool) -> Self {
		self.is_array = is_array;
		self
	}

	/// Apply each source's aggregate before the transform when grouped
	pub fn aggregated(mut self, use_aggregate: bool) -> Self {
		self.use_aggregate = use_aggregate;
		self
	}

	pub fn alias(&self) -> &str {
		&self.alias
	}
}

/// A registered transformation with resolved sources
#[derive(Debug)]
pub struct Transformation {
	pub(crate) alias: String,
	pub(crate) sources: Vec<ColumnRef>,
	pub(crate) kind: TransformKind,
	pub(crate) result_type: ColumnType,
	pub(crate) is_array: bool,
	pub(crate) use_aggregate: bool,
}

impl Transformation {
	pub fn alias(&self) -> &str {
		&self.alias
	}

	pub fn sources(&self) -> &[ColumnRef] {
		&self.sources
	}

	pub fn result_type(&self) -> ColumnType {
		self.result_type
	}

	pub fn is_array(&self) -> bool {
		self.is_array
	}

	pub fn use_aggregate(&self) -> bool {
		self.use_aggregate
	}

	pub fn is_post_fetch(&self) -> bool {
		matches!(self.kind, TransformKind::Value(_))
	}

	/// Render the SQL expression; `None` for post-fetch transformations
	pub fn render(&self, columns: &[String]) -> Option<String> {
		match &self.kind {
			TransformKind::Sql(format) => Some(format.apply(columns)),
			TransformKind::Value(_) => None,
		}
	}

	/// Compute the post-fetch value; `None` for SQL transformations
	pub fn compute(&self, values: &[QueryValue]) -> Option<QueryValue> {
		match &self.kind {
			TransformKind::Sql(_) => None,
			TransformKind::Value(f) => Some(f.apply(values)),
		}
	}

	/// Output name of the i-th hidden source column of a post-fetch transform
	pub fn hidden_column(&self, index: usize) -> String {
		format!("__{}__{}", self.alias, index)
	}
}
