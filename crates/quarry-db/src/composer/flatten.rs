//! Query chain flattening
//!
//! Serializes a chain of stages into one statement. Stage 0 selects from the
//! model's table; every later stage selects from the statement before it,
//! aliased `t{index}`. Placeholders are numbered across the whole statement
//! and the parameter list follows rendering order, innermost stage first.
//!
//! Columns an outer stage filters, orders or groups by are carried through
//! every inner statement even when the projection leaves them out; the
//! outermost statement selects the projection only.

use std::collections::HashSet;

use super::adapter::{Adapter, FilterScope, SelectFragment, StageSource};
use super::aggregate::{AggregateExpr, AggregateMap};
use super::columns::{
	ColumnRef, Join, JoinedColumn, ProjectedColumn, Projection, is_native_shape, joined_alias,
};
use super::schema::ModelSchema;
use super::stage::{Pagination, QueryStage};
use crate::backends::QueryValue;

/// A flattened statement ready to execute
#[derive(Debug, Clone)]
pub struct PreparedQuery {
	pub sql: String,
	pub params: Vec<QueryValue>,
	/// Any stage groups its rows
	pub grouped: bool,
	/// Rows have exactly the model's native shape and can be hydrated
	pub return_models: bool,
	pub columns: Vec<ProjectedColumn>,
}

/// Alias of the statement selected from by stage `index`
pub fn stage_alias(index: usize) -> String {
	format!("t{}", index)
}

/// Flatten `stages` (innermost first) into one nested SELECT
///
/// In summary mode the last stage is replaced by its aggregate variant: no
/// grouping keys, no ordering, no pagination.
pub fn flatten(
	schema: &ModelSchema,
	adapter: &dyn Adapter,
	projection: &Projection,
	stages: &[&QueryStage],
	summary: bool,
) -> PreparedQuery {
	let summary_stage = stages.last().filter(|_| summary).map(|stage| QueryStage {
		pagination: Pagination::default(),
		..stage.aggregate()
	});
	let last = stages.len().saturating_sub(1);
	let effective: Vec<&QueryStage> = stages
		.iter()
		.enumerate()
		.map(|(index, stage)| match &summary_stage {
			Some(aggregate) if index == last => aggregate,
			_ => *stage,
		})
		.collect();

	let grouped = effective.iter().any(|stage| stage.group_by().is_some());
	let columns = projection.resolve(schema);
	let mut inner_columns = columns.clone();
	inner_columns.extend(carried_columns(schema, effective.get(1..).unwrap_or(&[]), &columns));
	let aggregates = aggregate_map(schema, &inner_columns);

	let mut sql = String::new();
	let mut params = Vec::new();

	for (index, stage) in effective.iter().enumerate() {
		let alias = stage_alias(index);
		let derived = index > 0;
		let selected = if index < last { &inner_columns } else { &columns };
		let scope = FilterScope {
			qualifier: if derived { alias.as_str() } else { schema.table() },
			derived,
			joins: &projection.joins,
			// what the statement below this one selects
			columns: &inner_columns,
		};
		let filter = adapter.create_multi_filter(&scope, stage.filters());
		let joins: &[Join] = if derived { &[] } else { &projection.joins };

		let fragment = SelectFragment {
			source: if derived {
				StageSource::Subquery {
					sql: &sql,
					alias: &alias,
				}
			} else {
				StageSource::Table(schema.table())
			},
			columns: selected,
			filter: &filter,
			joins,
			group_by: stage.group_by(),
			aggregates: &aggregates,
			order_by: stage.order_by(),
			pagination: stage.pagination(),
		};

		let rendered = adapter.generate_select_query(&fragment, params.len());
		params.extend(adapter.params_from_multi_filter(&filter));
		sql = rendered;
	}

	PreparedQuery {
		sql,
		params,
		grouped,
		return_models: !grouped && is_native_shape(schema, &columns),
		columns,
	}
}

/// Columns `stages` reference by name that `visible` does not select
///
/// Derived stages read every column from the statement below them, so these
/// are selected by all but the outermost statement.
fn carried_columns(
	schema: &ModelSchema,
	stages: &[&QueryStage],
	visible: &[ProjectedColumn],
) -> Vec<ProjectedColumn> {
	let mut referenced: Vec<ColumnRef> = Vec::new();
	for stage in stages {
		referenced.extend(stage.order_by().iter().map(|order| order.column.clone()));
		for spec in stage.group_by().unwrap_or(&[]) {
			referenced.extend(spec.columns.iter().cloned());
		}
		referenced.extend(
			stage
				.filters()
				.iter()
				.flatten()
				.filter(|filter| filter.related.is_none())
				.map(|filter| ColumnRef::Native(filter.column.clone())),
		);
	}

	let mut keys: HashSet<String> = visible.iter().map(|c| c.key().to_string()).collect();
	let mut carried = Vec::new();
	for reference in referenced {
		let column = match reference {
			ColumnRef::Native(name) => schema.column(&name).cloned().map(ProjectedColumn::Native),
			ColumnRef::Related {
				relationship,
				column,
			} => schema.relationship(&relationship).and_then(|rel| {
				rel.target.column(&column).map(|def| {
					ProjectedColumn::Joined(JoinedColumn {
						table: rel.table().to_string(),
						relationship: rel.name.clone(),
						alias: joined_alias(&rel.name, &def.name),
						column: def.name.clone(),
						column_type: def.column_type,
					})
				})
			}),
			ColumnRef::Transformation(t) => Some(ProjectedColumn::Transformation(t)),
		};
		if let Some(column) = column {
			if keys.insert(column.key().to_string()) {
				carried.push(column);
			}
		}
	}
	carried
}

/// Aggregate per output key: native columns use the model's aggregates,
/// joined columns and related transformation sources the related model's
pub fn aggregate_map(schema: &ModelSchema, columns: &[ProjectedColumn]) -> AggregateMap {
	let mut map = AggregateMap::new();

	for column in columns {
		match column {
			ProjectedColumn::Native(def) => {
				if let Some(expr) = schema.aggregate_for(&def.name) {
					map.insert(def.name.clone(), expr.clone());
				}
			}
			ProjectedColumn::Joined(joined) => {
				let source = ColumnRef::Related {
					relationship: joined.relationship.clone(),
					column: joined.column.clone(),
				};
				if let Some(expr) = source_aggregate(schema, &source) {
					map.insert(joined.alias.clone(), expr.clone());
				}
			}
			ProjectedColumn::Transformation(t) => {
				for source in t.sources() {
					if let Some(expr) = source_aggregate(schema, source) {
						map.insert(source.key(), expr.clone());
					}
				}
			}
		}
	}

	map
}

fn source_aggregate<'a>(schema: &'a ModelSchema, source: &ColumnRef) -> Option<&'a AggregateExpr> {
	match source {
		ColumnRef::Native(name) => schema.aggregate_for(name),
		ColumnRef::Related {
			relationship,
			column,
		} => schema
			.relationship(relationship)
			.and_then(|rel| rel.target.aggregate_for(column)),
		ColumnRef::Transformation(_) => None,
	}
}
