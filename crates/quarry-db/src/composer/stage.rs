//! Query stages
//!
//! A composer chain is a list of frozen stages plus one open stage. Each stage
//! renders to one SELECT; every stage after the first selects from the
//! previous one.

use super::aggregate::{AggregateExpr, SqlFormat};
use super::columns::ColumnRef;
use super::filter::Filter;
use super::schema::ModelSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
	#[default]
	Asc,
	Desc,
}

impl Direction {
	/// Parse `asc`/`desc` case-insensitively; anything else is ascending
	pub fn from_keyword(keyword: Option<&str>) -> Self {
		match keyword.map(str::to_ascii_lowercase).as_deref() {
			Some("desc") => Direction::Desc,
			_ => Direction::Asc,
		}
	}

	pub fn as_sql(&self) -> &'static str {
		match self {
			Direction::Asc => "ASC",
			Direction::Desc => "DESC",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
	pub column: ColumnRef,
	pub direction: Direction,
	/// Caller-supplied formatter
	pub format: Option<SqlFormat>,
	/// Aggregate derived from the schema while the stage is grouped
	pub(crate) aggregate: Option<AggregateExpr>,
}

impl OrderSpec {
	pub fn new(column: ColumnRef, direction: Direction, format: Option<SqlFormat>) -> Self {
		Self {
			column,
			direction,
			format,
			aggregate: None,
		}
	}

	pub fn aggregate(&self) -> Option<&AggregateExpr> {
		self.aggregate.as_ref()
	}
}

/// One grouping key. Without a format every column is its own key; with a
/// format the columns are combined into a single key expression.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
	pub columns: Vec<ColumnRef>,
	pub format: Option<SqlFormat>,
}

/// Whether `key` is an unformatted grouping key
pub(crate) fn is_group_key(group_by: Option<&[GroupSpec]>, key: &str) -> bool {
	group_by.into_iter().flatten().any(|spec| {
		spec.format.is_none() && spec.columns.iter().any(|column| column.key() == key)
	})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
	/// Row limit; 0 means unlimited
	pub count: u64,
	pub offset: u64,
}

impl Pagination {
	/// Offsets add up; a set count can only shrink, and a count of 0 leaves
	/// it as it is
	pub fn narrow(&mut self, offset: u64, count: u64) {
		self.count = match (self.count, count) {
			(current, 0) | (0, current) => current,
			(current, requested) => current.min(requested),
		};
		self.offset += offset;
	}
}

#[derive(Debug, Clone, Default)]
pub struct QueryStage {
	pub(crate) filters: Vec<Vec<Filter>>,
	pub(crate) order_by: Vec<OrderSpec>,
	pub(crate) group_by: Option<Vec<GroupSpec>>,
	pub(crate) pagination: Pagination,
}

impl QueryStage {
	/// OR-ed groups of AND-ed predicates
	pub fn filters(&self) -> &[Vec<Filter>] {
		&self.filters
	}

	pub fn has_filters(&self) -> bool {
		!self.filters.is_empty()
	}

	pub fn order_by(&self) -> &[OrderSpec] {
		&self.order_by
	}

	pub fn group_by(&self) -> Option<&[GroupSpec]> {
		self.group_by.as_deref()
	}

	pub fn pagination(&self) -> Pagination {
		self.pagination
	}

	/// Grouped with no keys: a single aggregate row
	pub fn is_standalone_aggregate(&self) -> bool {
		matches!(&self.group_by, Some(keys) if keys.is_empty())
	}

	/// Whether `key` is selected plainly rather than aggregated
	pub fn is_group_key(&self, key: &str) -> bool {
		is_group_key(self.group_by(), key)
	}

	/// Copy of this stage collapsed to one aggregate row
	pub fn aggregate(&self) -> QueryStage {
		QueryStage {
			filters: self.filters.clone(),
			order_by: Vec::new(),
			group_by: Some(Vec::new()),
			pagination: self.pagination,
		}
	}

	pub(crate) fn limit(&mut self, offset: u64, count: u64) {
		self.pagination.narrow(offset, count);
	}

	/// Recompute the aggregate of every unformatted order entry
	///
	/// Entries get the schema's aggregate for their column while the stage is
	/// grouped; group keys and transformations order by their plain expression.
	pub(crate) fn derive_aggregate_order(&mut self, schema: &ModelSchema) {
		let grouped = self.group_by.is_some();
		let keys: Vec<String> = self
			.order_by
			.iter()
			.map(|order| order.column.key())
			.filter(|key| self.is_group_key(key))
			.collect();

		for order in &mut self.order_by {
			order.aggregate = None;
			if !grouped || order.format.is_some() || keys.contains(&order.column.key()) {
				continue;
			}
			order.aggregate = match &order.column {
				ColumnRef::Native(name) => {
					Some(schema.aggregate_for(name).cloned().unwrap_or(AggregateExpr::None))
				}
				ColumnRef::Related {
					relationship,
					column,
				} => Some(
					schema
						.relationship(relationship)
						.and_then(|rel| rel.target.aggregate_for(column).cloned())
						.unwrap_or(AggregateExpr::None),
				),
				ColumnRef::Transformation(_) => None,
			};
		}
	}
}
