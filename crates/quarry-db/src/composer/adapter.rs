//! Adapter bridge
//!
//! The composer hands each stage to an [`Adapter`] as a [`SelectFragment`];
//! the adapter renders it to SQL and reports the bound values of its
//! predicates in placeholder order.

mod sql;
pub mod sql_writer;

pub use sql::SqlAdapter;

use super::aggregate::{AggregateExpr, AggregateMap, SqlFormat};
use super::columns::{Join, ProjectedColumn, joined_alias};
use super::filter::{Comparator, Filter, FilterValue};
use super::stage::{GroupSpec, OrderSpec, Pagination, is_group_key};
use crate::backends::{DatabaseType, QueryValue};

/// Column a predicate tests
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateTarget {
	/// `"qualifier"."column"`
	Column { qualifier: String, column: String },
	/// Foreign key membership in a filtered subquery over the related table
	Related {
		qualifier: String,
		via: String,
		table: String,
		alias: String,
		column: String,
	},
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
	pub target: PredicateTarget,
	pub comparator: Comparator,
	pub value: FilterValue,
}

/// OR of AND-groups, resolved against one stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiFilter {
	pub groups: Vec<Vec<Predicate>>,
}

/// What a stage's predicates can reference
#[derive(Debug, Clone, Copy)]
pub struct FilterScope<'a> {
	/// Base table, or the alias of the inner statement
	pub qualifier: &'a str,
	pub derived: bool,
	/// Joins visible to the stage (base stage only)
	pub joins: &'a [Join],
	/// Columns the stage selects from (derived stages)
	pub columns: &'a [ProjectedColumn],
}

#[derive(Debug, Clone, Copy)]
pub enum StageSource<'a> {
	Table(&'a str),
	Subquery { sql: &'a str, alias: &'a str },
}

/// Everything needed to render one SELECT
#[derive(Debug, Clone, Copy)]
pub struct SelectFragment<'a> {
	pub source: StageSource<'a>,
	pub columns: &'a [ProjectedColumn],
	pub filter: &'a MultiFilter,
	pub joins: &'a [Join],
	pub group_by: Option<&'a [GroupSpec]>,
	pub aggregates: &'a AggregateMap,
	pub order_by: &'a [OrderSpec],
	pub pagination: Pagination,
}

impl SelectFragment<'_> {
	/// Name native columns are qualified with
	pub fn qualifier(&self) -> &str {
		match self.source {
			StageSource::Table(table) => table,
			StageSource::Subquery { alias, .. } => alias,
		}
	}

	pub fn is_derived(&self) -> bool {
		matches!(self.source, StageSource::Subquery { .. })
	}

	pub fn is_grouped(&self) -> bool {
		self.group_by.is_some()
	}

	pub fn is_group_key(&self, key: &str) -> bool {
		is_group_key(self.group_by, key)
	}

	/// Aggregate declared for an output column, `None` when undeclared
	pub fn aggregate_for(&self, key: &str) -> AggregateExpr {
		self.aggregates
			.get(key)
			.cloned()
			.unwrap_or(AggregateExpr::None)
	}
}

/// SQL generation backend for the composer
pub trait Adapter: Send + Sync {
	fn database_type(&self) -> DatabaseType;

	/// Comparators filter keys may use
	fn comparators(&self) -> &[Comparator];

	fn supports(&self, comparator: Comparator) -> bool {
		self.comparators().contains(&comparator)
	}

	/// Resolve filter groups against a stage
	///
	/// Related columns are referenced directly when the stage can see them
	/// (a joined relationship, or a passed-through `relationship$column`);
	/// otherwise the predicate tests the foreign key against a subquery.
	fn create_multi_filter(&self, scope: &FilterScope<'_>, groups: &[Vec<Filter>]) -> MultiFilter {
		let resolve = |filter: &Filter| {
			let target = match &filter.related {
				None => PredicateTarget::Column {
					qualifier: scope.qualifier.to_string(),
					column: filter.column.clone(),
				},
				Some(related) => {
					let alias = joined_alias(&related.relationship, &filter.column);
					if scope.derived && scope.columns.iter().any(|c| c.key() == alias) {
						PredicateTarget::Column {
							qualifier: scope.qualifier.to_string(),
							column: alias,
						}
					} else if !scope.derived
						&& scope
							.joins
							.iter()
							.any(|j| j.relationship == related.relationship)
					{
						PredicateTarget::Column {
							qualifier: related.relationship.clone(),
							column: filter.column.clone(),
						}
					} else {
						PredicateTarget::Related {
							qualifier: scope.qualifier.to_string(),
							via: related.via.clone(),
							table: related.table.clone(),
							alias: related.relationship.clone(),
							column: filter.column.clone(),
						}
					}
				}
			};
			Predicate {
				target,
				comparator: filter.comparator,
				value: filter.value.clone(),
			}
		};

		MultiFilter {
			groups: groups
				.iter()
				.filter(|group| !group.is_empty())
				.map(|group| group.iter().map(resolve).collect())
				.collect(),
		}
	}

	/// Bound values of a filter, in the order its placeholders are rendered
	fn params_from_multi_filter(&self, filter: &MultiFilter) -> Vec<QueryValue>;

	/// Render one SELECT whose first placeholder is `param_offset + 1`
	fn generate_select_query(&self, fragment: &SelectFragment<'_>, param_offset: usize) -> String;

	fn aggregate(&self, expr: &AggregateExpr) -> SqlFormat;
}
