//! Filter objects and their parsing
//!
//! A [`FilterObject`] is a flat, ordered map of `column__comparator` keys to
//! values. [`parse`] validates it against a schema, producing one AND-group of
//! [`Filter`] predicates. Keys naming an unknown column or comparator are
//! dropped rather than reported.

use indexmap::IndexMap;
use std::fmt;

use super::adapter::Adapter;
use super::schema::{Model, ModelSchema};
use super::stage::Direction;
use crate::backends::QueryValue;

/// Comparison operators understood by filter keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
	Is,
	Not,
	Lt,
	Lte,
	Gt,
	Gte,
	Contains,
	IContains,
	StartsWith,
	IStartsWith,
	EndsWith,
	IEndsWith,
	Like,
	ILike,
	IsNull,
	NotNull,
	In,
	NotIn,
}

impl Comparator {
	pub const ALL: [Comparator; 18] = [
		Comparator::Is,
		Comparator::Not,
		Comparator::Lt,
		Comparator::Lte,
		Comparator::Gt,
		Comparator::Gte,
		Comparator::Contains,
		Comparator::IContains,
		Comparator::StartsWith,
		Comparator::IStartsWith,
		Comparator::EndsWith,
		Comparator::IEndsWith,
		Comparator::Like,
		Comparator::ILike,
		Comparator::IsNull,
		Comparator::NotNull,
		Comparator::In,
		Comparator::NotIn,
	];

	/// Name as written in a filter key
	pub fn as_str(&self) -> &'static str {
		match self {
			Comparator::Is => "is",
			Comparator::Not => "not",
			Comparator::Lt => "lt",
			Comparator::Lte => "lte",
			Comparator::Gt => "gt",
			Comparator::Gte => "gte",
			Comparator::Contains => "contains",
			Comparator::IContains => "icontains",
			Comparator::StartsWith => "startswith",
			Comparator::IStartsWith => "istartswith",
			Comparator::EndsWith => "endswith",
			Comparator::IEndsWith => "iendswith",
			Comparator::Like => "like",
			Comparator::ILike => "ilike",
			Comparator::IsNull => "is_null",
			Comparator::NotNull => "not_null",
			Comparator::In => "in",
			Comparator::NotIn => "not_in",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|c| c.as_str() == name)
	}
}

impl fmt::Display for Comparator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Right-hand side of a filter key
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
	Value(QueryValue),
	List(Vec<QueryValue>),
	/// Primary key of a related model instance
	Related(QueryValue),
}

impl FilterValue {
	pub fn list<I, T>(values: I) -> Self
	where
		I: IntoIterator<Item = T>,
		T: Into<QueryValue>,
	{
		FilterValue::List(values.into_iter().map(Into::into).collect())
	}

	fn as_str(&self) -> Option<&str> {
		match self {
			FilterValue::Value(QueryValue::String(s)) => Some(s),
			_ => None,
		}
	}

	fn as_u64(&self) -> Option<u64> {
		match self {
			FilterValue::Value(QueryValue::Int(i)) => u64::try_from(*i).ok(),
			FilterValue::Value(QueryValue::String(s)) => s.trim().parse().ok(),
			_ => None,
		}
	}
}

macro_rules! filter_value_from {
	($($ty:ty),* $(,)?) => {
		$(
			impl From<$ty> for FilterValue {
				fn from(value: $ty) -> Self {
					FilterValue::Value(value.into())
				}
			}
		)*
	};
}

filter_value_from!(
	&str,
	String,
	i64,
	i32,
	f64,
	bool,
	chrono::DateTime<chrono::Utc>,
	uuid::Uuid,
	QueryValue,
);

impl<T: Into<QueryValue>> From<Vec<T>> for FilterValue {
	fn from(values: Vec<T>) -> Self {
		FilterValue::list(values)
	}
}

/// Ordered `key → value` filter object
///
/// # Examples
///
/// ```
/// use quarry_db::composer::FilterObject;
///
/// let filter = FilterObject::new()
///     .with("title__icontains", "rust")
///     .with("views__gte", 100)
///     .with("__order", "views desc");
///
/// assert_eq!(filter.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterObject {
	entries: IndexMap<String, FilterValue>,
}

impl FilterObject {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
		self.entries.insert(key.into(), value.into());
		self
	}

	/// Filter on a relationship by model instance, e.g. `with_model("user", &user)`
	pub fn with_model<M: Model>(mut self, relationship: impl Into<String>, model: &M) -> Self {
		self.entries.insert(
			relationship.into(),
			FilterValue::Related(model.id().unwrap_or(QueryValue::Null)),
		);
		self
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for FilterObject {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			entries: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}

/// Anything `filter()` accepts: one object, or several OR-ed together
pub trait IntoFilterGroups {
	fn into_filter_groups(self) -> Vec<FilterObject>;
}

impl IntoFilterGroups for FilterObject {
	fn into_filter_groups(self) -> Vec<FilterObject> {
		vec![self]
	}
}

impl IntoFilterGroups for Vec<FilterObject> {
	fn into_filter_groups(self) -> Vec<FilterObject> {
		self
	}
}

impl<const N: usize> IntoFilterGroups for [FilterObject; N] {
	fn into_filter_groups(self) -> Vec<FilterObject> {
		self.into()
	}
}

/// Relationship a filter reaches through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTarget {
	pub relationship: String,
	pub table: String,
	pub via: String,
}

/// One validated predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
	pub related: Option<RelatedTarget>,
	pub column: String,
	pub comparator: Comparator,
	pub value: FilterValue,
}

impl Filter {
	/// Table the column lives on, when it is not the base table
	pub fn table(&self) -> Option<&str> {
		self.related.as_ref().map(|r| r.table.as_str())
	}
}

/// Result of parsing one filter object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFilters {
	pub predicates: Vec<Filter>,
	/// From `__order`: column and direction
	pub order: Option<(String, Direction)>,
	/// From `__offset` / `__count`: offset and count
	pub limit: Option<(u64, u64)>,
}

/// Validate a filter object against a schema
pub fn parse(object: &FilterObject, schema: &ModelSchema, adapter: &dyn Adapter) -> ParsedFilters {
	let mut parsed = ParsedFilters::default();

	if let Some(order) = object.entries.get("__order").and_then(FilterValue::as_str) {
		let mut parts = order.split_whitespace();
		if let Some(column) = parts.next() {
			parsed.order = Some((column.to_string(), Direction::from_keyword(parts.next())));
		}
	}

	let offset = object.entries.get("__offset");
	let count = object.entries.get("__count");
	if offset.is_some() || count.is_some() {
		parsed.limit = Some((
			offset.and_then(FilterValue::as_u64).unwrap_or(0),
			count.and_then(FilterValue::as_u64).unwrap_or(0),
		));
	}

	for (key, value) in object.iter() {
		if key.starts_with("__") {
			continue;
		}

		// A bare relationship name filters on its foreign key
		let (key, value) = match schema.relationship(key) {
			Some(rel) => (rel.via.as_str(), unwrap_related(value)),
			None => (key, value.clone()),
		};

		match parse_key(key, value, schema, adapter) {
			Some(filter) => parsed.predicates.push(filter),
			None => tracing::debug!(model = schema.name(), key, "dropping invalid filter key"),
		}
	}

	parsed
}

fn unwrap_related(value: &FilterValue) -> FilterValue {
	match value {
		FilterValue::Related(id) => FilterValue::Value(id.clone()),
		other => other.clone(),
	}
}

fn parse_key(
	key: &str,
	value: FilterValue,
	schema: &ModelSchema,
	adapter: &dyn Adapter,
) -> Option<Filter> {
	let mut segments: Vec<&str> = key.split("__").collect();

	let relationship = if segments.len() > 1 {
		schema.relationship(segments[0])
	} else {
		None
	};
	if relationship.is_some() {
		segments.remove(0);
	}

	let comparator = if segments.len() > 1 {
		segments.pop().and_then(Comparator::from_name)?
	} else {
		Comparator::Is
	};
	if !adapter.supports(comparator) {
		return None;
	}

	let column = segments.join("__");
	let target = relationship.map(|r| r.target.as_ref()).unwrap_or(schema);
	if !target.has_column(&column) {
		return None;
	}

	Some(Filter {
		related: relationship.map(|rel| RelatedTarget {
			relationship: rel.name.clone(),
			table: rel.table().to_string(),
			via: rel.via.clone(),
		}),
		column,
		comparator,
		value: unwrap_related(&value),
	})
}
