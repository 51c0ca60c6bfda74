//! Reference SQL adapter for PostgreSQL and SQLite

use super::sql_writer::{SqlWriter, qualified};
use super::{Adapter, MultiFilter, Predicate, PredicateTarget, SelectFragment, StageSource};
use crate::backends::{DatabaseType, QueryValue};
use crate::composer::aggregate::{AggregateExpr, SqlFormat};
use crate::composer::columns::{ColumnRef, ProjectedColumn};
use crate::composer::filter::{Comparator, FilterValue};
use crate::composer::stage::OrderSpec;
use crate::composer::transform::Transformation;

/// Adapter rendering the composer's fragments as PostgreSQL or SQLite
///
/// # Examples
///
/// ```
/// use quarry_db::composer::{Adapter, AggregateExpr, SqlAdapter};
///
/// let adapter = SqlAdapter::sqlite();
/// let sum = adapter.aggregate(&AggregateExpr::Sum);
/// assert_eq!(sum.apply(&["\"views\"".to_string()]), "SUM(\"views\")");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SqlAdapter {
	database_type: DatabaseType,
}

impl SqlAdapter {
	pub fn new(database_type: DatabaseType) -> Self {
		Self { database_type }
	}

	pub fn postgres() -> Self {
		Self::new(DatabaseType::Postgres)
	}

	pub fn sqlite() -> Self {
		Self::new(DatabaseType::Sqlite)
	}

	fn array_agg(&self, expr: &str) -> String {
		match self.database_type {
			DatabaseType::Postgres => format!("ARRAY_AGG({})", expr),
			DatabaseType::Sqlite => format!("json_group_array({})", expr),
		}
	}

	fn like(&self, case_insensitive: bool) -> &'static str {
		match (self.database_type, case_insensitive) {
			(DatabaseType::Postgres, true) => "ILIKE",
			_ => "LIKE",
		}
	}

	fn write_multi_filter(&self, writer: &mut SqlWriter, filter: &MultiFilter) {
		let parenthesize = filter.groups.len() > 1;
		writer.push_list(&filter.groups, " OR ", |w, group| {
			if parenthesize {
				w.push("(");
			}
			w.push_list(group, " AND ", |w, predicate| self.write_predicate(w, predicate));
			if parenthesize {
				w.push(")");
			}
		});
	}

	fn write_predicate(&self, writer: &mut SqlWriter, predicate: &Predicate) {
		match &predicate.target {
			PredicateTarget::Column { qualifier, column } => {
				let expr = qualified(qualifier, column);
				self.write_comparison(writer, &expr, predicate.comparator, &predicate.value);
			}
			PredicateTarget::Related {
				qualifier,
				via,
				table,
				alias,
				column,
			} => {
				writer.push(&qualified(qualifier, via));
				writer.push(" IN (SELECT ");
				writer.push(&qualified(alias, "id"));
				writer.push(" FROM ");
				writer.push_identifier(table);
				writer.push(" AS ");
				writer.push_identifier(alias);
				writer.push(" WHERE ");
				let expr = qualified(alias, column);
				self.write_comparison(writer, &expr, predicate.comparator, &predicate.value);
				writer.push(")");
			}
		}
	}

	fn write_comparison(
		&self,
		writer: &mut SqlWriter,
		expr: &str,
		comparator: Comparator,
		value: &FilterValue,
	) {
		let list = match value {
			FilterValue::List(values) => Some(values.as_slice()),
			FilterValue::Value(QueryValue::Array(values)) => Some(values.as_slice()),
			_ => None,
		};

		match (comparator, list) {
			(Comparator::In | Comparator::NotIn, Some([])) => {
				writer.push(if comparator == Comparator::In {
					"1 = 0"
				} else {
					"1 = 1"
				});
			}
			(Comparator::In | Comparator::NotIn, Some(values)) => {
				self.write_in(writer, expr, comparator, values);
			}
			(_, Some([])) => writer.push("1 = 0"),
			(_, Some([single])) => self.write_single(writer, expr, comparator, single),
			(_, Some(values)) => {
				writer.push("(");
				writer.push_list(values, " OR ", |w, v| self.write_single(w, expr, comparator, v));
				writer.push(")");
			}
			(_, None) => match value {
				FilterValue::Value(v) | FilterValue::Related(v) => {
					self.write_single(writer, expr, comparator, v)
				}
				FilterValue::List(_) => {}
			},
		}
	}

	fn write_in(
		&self,
		writer: &mut SqlWriter,
		expr: &str,
		comparator: Comparator,
		values: &[QueryValue],
	) {
		writer.push(expr);
		writer.push(if comparator == Comparator::NotIn {
			" NOT IN ("
		} else {
			" IN ("
		});
		writer.push_list(values, ", ", |w, v| {
			w.push_value(v);
		});
		writer.push(")");
	}

	fn write_single(
		&self,
		writer: &mut SqlWriter,
		expr: &str,
		comparator: Comparator,
		value: &QueryValue,
	) {
		let binary = |writer: &mut SqlWriter, op: &str| {
			writer.push(expr);
			writer.push(" ");
			writer.push(op);
			writer.push(" ");
			writer.push_value(value);
		};

		match comparator {
			Comparator::Is if value.is_null() => {
				writer.push(expr);
				writer.push(" IS NULL");
			}
			Comparator::Not if value.is_null() => {
				writer.push(expr);
				writer.push(" IS NOT NULL");
			}
			Comparator::Is => binary(writer, "="),
			Comparator::Not => binary(writer, "<>"),
			Comparator::Lt => binary(writer, "<"),
			Comparator::Lte => binary(writer, "<="),
			Comparator::Gt => binary(writer, ">"),
			Comparator::Gte => binary(writer, ">="),
			Comparator::Like => binary(writer, self.like(false)),
			Comparator::ILike => binary(writer, self.like(true)),
			Comparator::Contains | Comparator::IContains => {
				writer.push(expr);
				writer.push(" ");
				writer.push(self.like(comparator == Comparator::IContains));
				writer.push(" '%' || ");
				writer.push_value(value);
				writer.push(" || '%'");
			}
			Comparator::StartsWith | Comparator::IStartsWith => {
				writer.push(expr);
				writer.push(" ");
				writer.push(self.like(comparator == Comparator::IStartsWith));
				writer.push(" ");
				writer.push_value(value);
				writer.push(" || '%'");
			}
			Comparator::EndsWith | Comparator::IEndsWith => {
				writer.push(expr);
				writer.push(" ");
				writer.push(self.like(comparator == Comparator::IEndsWith));
				writer.push(" '%' || ");
				writer.push_value(value);
			}
			Comparator::IsNull | Comparator::NotNull => {
				// `is_null: false` flips the test
				let negate = matches!(value, QueryValue::Bool(false));
				let is_null = (comparator == Comparator::IsNull) != negate;
				writer.push(expr);
				writer.push(if is_null { " IS NULL" } else { " IS NOT NULL" });
			}
			Comparator::In | Comparator::NotIn => {
				self.write_in(writer, expr, comparator, std::slice::from_ref(value));
			}
		}
	}
}

impl Default for SqlAdapter {
	fn default() -> Self {
		Self::postgres()
	}
}

/// Expression builder for one fragment
struct StageRenderer<'a> {
	adapter: &'a SqlAdapter,
	fragment: &'a SelectFragment<'a>,
}

impl StageRenderer<'_> {
	fn qualifier(&self) -> &str {
		self.fragment.qualifier()
	}

	fn wrap(&self, expr: &AggregateExpr, plain: String) -> String {
		self.adapter.aggregate(expr).apply(&[plain])
	}

	/// Ungrouped expression of a column as this stage sees it
	fn plain(&self, column: &ColumnRef) -> String {
		let derived = self.fragment.is_derived();
		match column {
			ColumnRef::Native(name) => qualified(self.qualifier(), name),
			ColumnRef::Related { .. } if derived => qualified(self.qualifier(), &column.key()),
			ColumnRef::Related {
				relationship,
				column,
			} => qualified(relationship, column),
			ColumnRef::Transformation(t) if derived => qualified(self.qualifier(), t.alias()),
			ColumnRef::Transformation(t) => {
				let sources: Vec<String> = t.sources().iter().map(|s| self.plain(s)).collect();
				t.render(&sources).unwrap_or_else(|| "NULL".to_string())
			}
		}
	}

	fn collapses(&self, key: &str) -> bool {
		self.fragment.is_grouped() && !self.fragment.is_group_key(key)
	}

	/// Select expression of a SQL transformation
	fn transformation(&self, t: &Transformation) -> String {
		let key = t.alias();
		let first_source = t
			.sources()
			.first()
			.map(|s| self.fragment.aggregate_for(&s.key()))
			.unwrap_or(AggregateExpr::None);

		if self.fragment.is_derived() {
			let plain = qualified(self.qualifier(), key);
			return match (self.collapses(key), t.is_array()) {
				(false, _) => plain,
				(true, true) => self.adapter.array_agg(&plain),
				(true, false) => self.wrap(&first_source, plain),
			};
		}

		let sources: Vec<String> = t.sources().iter().map(|s| self.plain(s)).collect();
		if !self.collapses(key) {
			return t.render(&sources).unwrap_or_else(|| "NULL".to_string());
		}

		if t.use_aggregate() {
			let aggregated: Vec<String> = t
				.sources()
				.iter()
				.zip(sources)
				.map(|(source, expr)| self.wrap(&self.fragment.aggregate_for(&source.key()), expr))
				.collect();
			t.render(&aggregated).unwrap_or_else(|| "NULL".to_string())
		} else if t.is_array() {
			let inner = t.render(&sources).unwrap_or_else(|| "NULL".to_string());
			self.adapter.array_agg(&inner)
		} else {
			let inner = t.render(&sources).unwrap_or_else(|| "NULL".to_string());
			self.wrap(&first_source, inner)
		}
	}

	/// `(expression, output name)` pairs a projected column selects
	fn select_items(&self, column: &ProjectedColumn) -> Vec<(String, String)> {
		let derived = self.fragment.is_derived();
		match column {
			ProjectedColumn::Transformation(t) if t.is_post_fetch() => t
				.sources()
				.iter()
				.enumerate()
				.map(|(i, source)| {
					let name = t.hidden_column(i);
					let plain = if derived {
						qualified(self.qualifier(), &name)
					} else {
						self.plain(source)
					};
					let expr = if self.collapses(&source.key()) {
						self.wrap(&self.fragment.aggregate_for(&source.key()), plain)
					} else {
						plain
					};
					(expr, name)
				})
				.collect(),
			ProjectedColumn::Transformation(t) => {
				vec![(self.transformation(t), t.alias().to_string())]
			}
			other => {
				let key = other.key();
				let plain = match other {
					ProjectedColumn::Joined(joined) if !derived => {
						qualified(&joined.relationship, &joined.column)
					}
					_ => qualified(self.qualifier(), key),
				};
				let expr = if self.collapses(key) {
					self.wrap(&self.fragment.aggregate_for(key), plain)
				} else {
					plain
				};
				vec![(expr, key.to_string())]
			}
		}
	}

	fn order_item(&self, order: &OrderSpec) -> String {
		let expr = match &order.column {
			ColumnRef::Transformation(t) => self.transformation(t),
			column => {
				let plain = self.plain(column);
				match (&order.format, order.aggregate()) {
					(Some(format), _) => format.apply(&[plain]),
					(None, Some(aggregate)) => self.wrap(aggregate, plain),
					(None, None) => plain,
				}
			}
		};
		format!("{} {}", expr, order.direction.as_sql())
	}
}

impl Adapter for SqlAdapter {
	fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	fn comparators(&self) -> &[Comparator] {
		&Comparator::ALL
	}

	fn params_from_multi_filter(&self, filter: &MultiFilter) -> Vec<QueryValue> {
		let mut writer = SqlWriter::new(self.database_type, 0);
		self.write_multi_filter(&mut writer, filter);
		writer.finish().1
	}

	fn generate_select_query(&self, fragment: &SelectFragment<'_>, param_offset: usize) -> String {
		let renderer = StageRenderer {
			adapter: self,
			fragment,
		};
		let mut writer = SqlWriter::new(self.database_type, param_offset);

		writer.push("SELECT ");
		let items: Vec<(String, String)> = fragment
			.columns
			.iter()
			.flat_map(|column| renderer.select_items(column))
			.collect();
		if items.is_empty() {
			writer.push("*");
		}
		writer.push_list(&items, ", ", |w, (expr, name)| {
			w.push(expr);
			w.push(" AS ");
			w.push_identifier(name);
		});

		writer.push(" FROM ");
		match fragment.source {
			StageSource::Table(table) => writer.push_identifier(table),
			StageSource::Subquery { sql, alias } => {
				writer.push("(");
				writer.push(sql);
				writer.push(") AS ");
				writer.push_identifier(alias);
			}
		}

		if !fragment.is_derived() {
			for join in fragment.joins {
				writer.push(" LEFT JOIN ");
				writer.push_identifier(&join.table);
				writer.push(" AS ");
				writer.push_identifier(&join.relationship);
				writer.push(" ON ");
				writer.push(&qualified(&join.relationship, &join.field));
				writer.push(" = ");
				writer.push(&qualified(fragment.qualifier(), &join.base_field));
			}
		}

		if !fragment.filter.groups.iter().all(Vec::is_empty) {
			writer.push(" WHERE ");
			self.write_multi_filter(&mut writer, fragment.filter);
		}

		let group_items: Vec<String> = fragment
			.group_by
			.into_iter()
			.flatten()
			.flat_map(|spec| {
				let exprs: Vec<String> = spec.columns.iter().map(|c| renderer.plain(c)).collect();
				match &spec.format {
					Some(format) => vec![format.apply(&exprs)],
					None => exprs,
				}
			})
			.collect();
		if !group_items.is_empty() {
			writer.push(" GROUP BY ");
			writer.push(&group_items.join(", "));
		}

		if !fragment.order_by.is_empty() {
			writer.push(" ORDER BY ");
			writer.push_list(fragment.order_by, ", ", |w, order| {
				w.push(&renderer.order_item(order));
			});
		}

		let pagination = fragment.pagination;
		if pagination.count > 0 {
			writer.push(&format!(" LIMIT {}", pagination.count));
		} else if pagination.offset > 0 && self.database_type == DatabaseType::Sqlite {
			writer.push(" LIMIT -1");
		}
		if pagination.offset > 0 {
			writer.push(&format!(" OFFSET {}", pagination.offset));
		}

		writer.finish().0
	}

	fn aggregate(&self, expr: &AggregateExpr) -> SqlFormat {
		let expr = expr.clone();
		SqlFormat::new(move |columns| match columns.first() {
			Some(column) => expr.render(column),
			None => "NULL".to_string(),
		})
	}
}
