//! The query composer
//!
//! A [`Composer`] is a value: every builder call consumes it and returns the
//! updated composer, and branching is done with [`Composer::copy`]. Nothing
//! touches the database until [`Composer::end`] or [`Composer::summarize`].
//!
//! # Examples
//!
//! ```no_run
//! # use quarry_db::prelude::*;
//! # async fn example<Post: Model>(db: Database) -> quarry_db::composer::Result<()> {
//! let outcome = db
//!     .query::<Post>()
//!     .filter(FilterObject::new().with("views__gte", 100))
//!     .join("user")?
//!     .order_by("created_at", Direction::Desc)?
//!     .limit(20)
//!     .end()
//!     .await;
//!
//! assert!(outcome.is_ok());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::Instant;

use super::aggregate::SqlFormat;
use super::columns::{ColumnRef, ColumnRequest, Join, JoinedColumn, Projection, joined_alias};
use super::database::Database;
use super::error::{ComposerError, Result};
use super::filter::{self, IntoFilterGroups};
use super::flatten::{PreparedQuery, flatten};
use super::record::{ComposerRecord, QueryOutcome, ResourceShape, hydrate, materialize};
use super::schema::{ColumnType, Model, ModelSchema, Relationship};
use super::stage::{Direction, GroupSpec, OrderSpec, QueryStage};
use super::transform::{TransformSpec, Transformation};
use crate::backends::Row;

pub struct Composer<M> {
	db: Database,
	schema: Arc<ModelSchema>,
	/// Frozen stages, innermost first
	chain: Vec<Arc<QueryStage>>,
	stage: QueryStage,
	projection: Projection,
	_model: PhantomData<fn() -> M>,
}

impl<M> Clone for Composer<M> {
	fn clone(&self) -> Self {
		Self {
			db: self.db.clone(),
			schema: self.schema.clone(),
			chain: self.chain.clone(),
			stage: self.stage.clone(),
			projection: self.projection.clone(),
			_model: PhantomData,
		}
	}
}

impl<M> fmt::Debug for Composer<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Composer")
			.field("model", &self.schema.name())
			.field("chain", &self.chain)
			.field("stage", &self.stage)
			.field("projection", &self.projection)
			.finish()
	}
}

impl<M: Model> Composer<M> {
	pub fn new(db: Database) -> Self {
		Self {
			db,
			schema: M::schema(),
			chain: Vec::new(),
			stage: QueryStage::default(),
			projection: Projection::default(),
			_model: PhantomData,
		}
	}

	pub fn schema(&self) -> &Arc<ModelSchema> {
		&self.schema
	}

	pub fn projection(&self) -> &Projection {
		&self.projection
	}

	/// Number of stages, the open one included
	pub fn stage_count(&self) -> usize {
		self.chain.len() + 1
	}

	/// The open stage
	pub fn current_stage(&self) -> &QueryStage {
		&self.stage
	}

	/// All stages, innermost first
	pub fn stages(&self) -> Vec<&QueryStage> {
		self.chain
			.iter()
			.map(Arc::as_ref)
			.chain(std::iter::once(&self.stage))
			.collect()
	}

	/// Add OR-ed filter objects
	///
	/// When the open stage already filters, it is frozen and the new filters
	/// apply to the result of it. Invalid keys are dropped.
	pub fn filter(mut self, filters: impl IntoFilterGroups) -> Self {
		if self.stage.has_filters() {
			let frozen = std::mem::take(&mut self.stage);
			self.chain.push(Arc::new(frozen));
			tracing::debug!(
				model = self.schema.name(),
				stages = self.stage_count(),
				"opened query stage"
			);
		}

		let adapter = self.db.adapter().clone();
		for object in filters.into_filter_groups() {
			let parsed = filter::parse(&object, &self.schema, adapter.as_ref());

			if let Some((column, direction)) = parsed.order {
				if let Err(error) = self.push_order(&column, direction, None) {
					tracing::debug!(model = self.schema.name(), %error, "ignoring __order");
				}
			}
			if let Some((offset, count)) = parsed.limit {
				self.stage.limit(offset, count);
			}
			if !parsed.predicates.is_empty() {
				self.stage.filters.push(parsed.predicates);
			}
		}

		self
	}

	/// Join a relationship, selecting every column of the related model
	pub fn join(self, relationship: &str) -> Result<Self> {
		let columns: Vec<String> = self
			.relationship(relationship)?
			.target
			.columns()
			.iter()
			.map(|c| c.name.clone())
			.collect();
		self.join_columns(relationship, columns)
	}

	/// Join a relationship, selecting `columns` as `relationship$column`
	pub fn join_columns<I, S>(mut self, relationship: &str, columns: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let rel = self.relationship(relationship)?.clone();
		let defs = columns
			.into_iter()
			.map(|name| {
				rel.target
					.column(name.as_ref())
					.cloned()
					.ok_or_else(|| ComposerError::UnknownColumn {
						model: rel.target.name().to_string(),
						column: name.as_ref().to_string(),
					})
			})
			.collect::<Result<Vec<_>>>()?;

		self.ensure_join(&rel);
		for def in defs {
			let alias = joined_alias(&rel.name, &def.name);
			if self.projection.joined_columns.iter().any(|jc| jc.alias == alias) {
				continue;
			}
			self.projection.joined_columns.push(JoinedColumn {
				table: rel.table().to_string(),
				relationship: rel.name.clone(),
				alias,
				column: def.name,
				column_type: def.column_type,
			});
		}

		Ok(self)
	}

	pub fn order_by(mut self, field: &str, direction: Direction) -> Result<Self> {
		self.push_order(field, direction, None)?;
		Ok(self)
	}

	/// Order by `format` applied to the column expression
	pub fn order_by_format<F>(mut self, field: &str, direction: Direction, format: F) -> Result<Self>
	where
		F: Fn(&[String]) -> String + Send + Sync + 'static,
	{
		self.push_order(field, direction, Some(SqlFormat::new(format)))?;
		Ok(self)
	}

	/// Group by a column, a transformation or `relationship__column`
	///
	/// A bare relationship name groups by every column of the related model.
	pub fn group_by(mut self, field: &str) -> Result<Self> {
		if let Some(rel) = self.schema.relationship(field).cloned() {
			self.ensure_join(&rel);
			let keys = rel.target.columns().iter().map(|c| GroupSpec {
				columns: vec![ColumnRef::Related {
					relationship: rel.name.clone(),
					column: c.name.clone(),
				}],
				format: None,
			});
			self.stage.group_by.get_or_insert_with(Vec::new).extend(keys);
		} else {
			let column = self.groupable(field)?;
			self.stage.group_by.get_or_insert_with(Vec::new).push(GroupSpec {
				columns: vec![column],
				format: None,
			});
		}

		self.stage.derive_aggregate_order(&self.schema);
		Ok(self)
	}

	/// Group by one key computed by `format` from several columns
	pub fn group_by_format<I, S, F>(mut self, fields: I, format: F) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
		F: Fn(&[String]) -> String + Send + Sync + 'static,
	{
		let columns = fields
			.into_iter()
			.map(|field| self.groupable(field.as_ref()))
			.collect::<Result<Vec<_>>>()?;

		self.stage.group_by.get_or_insert_with(Vec::new).push(GroupSpec {
			columns,
			format: Some(SqlFormat::new(format)),
		});
		self.stage.derive_aggregate_order(&self.schema);
		Ok(self)
	}

	/// Copy collapsed to a single aggregate row
	pub fn aggregate(&self) -> Self {
		let mut copy = self.clone();
		copy.stage = self.stage.aggregate();
		copy
	}

	/// Register a computed column
	pub fn transform(mut self, spec: TransformSpec) -> Result<Self> {
		let invalid = |reason: &str| ComposerError::InvalidTransform {
			alias: spec.alias.clone(),
			reason: reason.to_string(),
		};
		if spec.alias.is_empty() {
			return Err(invalid("alias is empty"));
		}
		if self.schema.has_column(&spec.alias) {
			return Err(invalid("alias shadows a column of the model"));
		}

		let sources = spec
			.columns
			.iter()
			.map(|name| self.resolve_column(name))
			.collect::<Result<Vec<_>>>()?;
		for source in &sources {
			self.ensure_join_for(source);
		}

		let result_type = spec
			.result_type
			.or_else(|| sources.first().and_then(|s| self.column_type(s)))
			.unwrap_or(ColumnType::String);

		let transformation = Transformation {
			alias: spec.alias,
			sources,
			kind: spec.kind,
			result_type,
			is_array: spec.is_array,
			use_aggregate: spec.use_aggregate,
		};
		self.projection
			.transformations
			.insert(transformation.alias.clone(), Arc::new(transformation));
		Ok(self)
	}

	/// Register a computed column that collects into an array when grouped
	pub fn stransform(self, spec: TransformSpec) -> Result<Self> {
		self.transform(spec.array(true))
	}

	pub fn limit(self, count: u64) -> Self {
		self.limit_offset(0, count)
	}

	/// Offsets accumulate; the count only narrows once set
	pub fn limit_offset(mut self, offset: u64, count: u64) -> Self {
		self.stage.limit(offset, count);
		self
	}

	/// Select only `columns`; names that are neither a column nor a
	/// transformation are ignored
	pub fn interface<I, C>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = C>,
		C: Into<ColumnRequest>,
	{
		self.projection.requested = columns
			.into_iter()
			.map(Into::into)
			.filter(|request| match request {
				ColumnRequest::Column(name) => {
					self.schema.has_column(name) || self.projection.transformations.contains_key(name)
				}
				ColumnRequest::Relationship { .. } => true,
			})
			.collect();
		self
	}

	/// Select the model's external interface
	pub fn external(self) -> Self {
		let columns = self.schema.external_interface();
		self.interface(columns)
	}

	/// Independent branch of this composer
	pub fn copy(&self) -> Self {
		self.clone()
	}

	pub fn prepare(&self) -> PreparedQuery {
		flatten(
			&self.schema,
			self.db.adapter().as_ref(),
			&self.projection,
			&self.stages(),
			false,
		)
	}

	/// Statement fetching the single aggregate row
	pub fn prepare_summary(&self) -> PreparedQuery {
		flatten(
			&self.schema,
			self.db.adapter().as_ref(),
			&self.projection,
			&self.stages(),
			true,
		)
	}

	pub fn to_sql(&self) -> String {
		self.prepare().sql
	}

	/// Run the query
	///
	/// Failures are reported in the record, never returned.
	pub async fn end(&self) -> QueryOutcome<M> {
		self.run(self.prepare(), None).await
	}

	/// Fetch the aggregate row, then run the query with it as the summary
	pub async fn summarize(&self) -> QueryOutcome<M> {
		let prepared = self.prepare_summary();
		match self.fetch(&prepared).await {
			Ok(rows) => {
				let summary = materialize(rows, &prepared.columns, true).into_iter().next();
				self.run(self.prepare(), summary).await
			}
			Err(error) => QueryOutcome {
				record: ComposerRecord::failed(
					error,
					ResourceShape::new(self.schema.name(), &prepared.columns, prepared.grouped),
				),
				models: None,
			},
		}
	}

	async fn run(&self, prepared: PreparedQuery, summary: Option<Row>) -> QueryOutcome<M> {
		let resource = ResourceShape::new(self.schema.name(), &prepared.columns, prepared.grouped);

		let rows = match self.fetch(&prepared).await {
			Ok(rows) => materialize(rows, &prepared.columns, prepared.grouped),
			Err(error) => {
				let mut record = ComposerRecord::failed(error, resource);
				record.summary = summary;
				return QueryOutcome {
					record,
					models: None,
				};
			}
		};

		let mut record = ComposerRecord {
			error: None,
			rows,
			resource,
			summary,
		};
		let models = if prepared.return_models {
			match hydrate::<M>(&record.rows) {
				Ok(models) => Some(models),
				Err(error) => {
					tracing::warn!(model = self.schema.name(), %error, "hydration failed");
					record.error = Some(error);
					None
				}
			}
		} else {
			None
		};

		QueryOutcome { record, models }
	}

	async fn fetch(&self, prepared: &PreparedQuery) -> Result<Vec<Row>> {
		let config = self.db.config();
		if config.log_sql {
			tracing::info!(sql = %prepared.sql, params = prepared.params.len(), "executing query");
		} else {
			tracing::debug!(sql = %prepared.sql, params = prepared.params.len(), "executing query");
		}

		let started = Instant::now();
		let result = self
			.db
			.connection()
			.fetch_all(&prepared.sql, prepared.params.clone())
			.await;
		let elapsed = started.elapsed();

		if let Some(threshold) = config.slow_query_threshold() {
			if elapsed > threshold {
				tracing::warn!(
					elapsed_ms = elapsed.as_millis() as u64,
					sql = %prepared.sql,
					"slow query"
				);
			}
		}

		result.map_err(|error| {
			tracing::warn!(model = self.schema.name(), %error, "query failed");
			ComposerError::from(error)
		})
	}

	fn push_order(
		&mut self,
		field: &str,
		direction: Direction,
		format: Option<SqlFormat>,
	) -> Result<()> {
		if self.stage.is_standalone_aggregate() {
			return Err(ComposerError::StandaloneAggregateOrder);
		}

		let column = self.resolve_field(field)?;
		reject_post_fetch(&column, "post-fetch transformations can not be ordered by")?;
		self.ensure_join_for(&column);

		self.stage.order_by.push(OrderSpec::new(column, direction, format));
		self.stage.derive_aggregate_order(&self.schema);
		Ok(())
	}

	fn groupable(&mut self, field: &str) -> Result<ColumnRef> {
		let column = self.resolve_field(field)?;
		reject_post_fetch(&column, "post-fetch transformations can not be grouped by")?;
		self.ensure_join_for(&column);
		Ok(column)
	}

	fn relationship(&self, name: &str) -> Result<&Relationship> {
		self.schema
			.relationship(name)
			.ok_or_else(|| ComposerError::UnknownRelationship {
				model: self.schema.name().to_string(),
				relationship: name.to_string(),
			})
	}

	/// A transformation alias, a native column or `relationship__column`
	fn resolve_field(&self, field: &str) -> Result<ColumnRef> {
		match self.projection.transformations.get(field) {
			Some(t) => Ok(ColumnRef::Transformation(t.clone())),
			None => self.resolve_column(field),
		}
	}

	fn resolve_column(&self, field: &str) -> Result<ColumnRef> {
		if self.schema.has_column(field) {
			return Ok(ColumnRef::Native(field.to_string()));
		}

		let Some((relationship, column)) = field.split_once("__") else {
			return Err(ComposerError::UnknownColumn {
				model: self.schema.name().to_string(),
				column: field.to_string(),
			});
		};

		let rel = self.relationship(relationship)?;
		if !rel.target.has_column(column) {
			return Err(ComposerError::UnknownColumn {
				model: rel.target.name().to_string(),
				column: column.to_string(),
			});
		}

		Ok(ColumnRef::Related {
			relationship: rel.name.clone(),
			column: column.to_string(),
		})
	}

	fn column_type(&self, column: &ColumnRef) -> Option<ColumnType> {
		match column {
			ColumnRef::Native(name) => self.schema.column(name).map(|c| c.column_type),
			ColumnRef::Related {
				relationship,
				column,
			} => self
				.schema
				.relationship(relationship)
				.and_then(|rel| rel.target.column(column))
				.map(|c| c.column_type),
			ColumnRef::Transformation(t) => Some(t.result_type()),
		}
	}

	fn ensure_join_for(&mut self, column: &ColumnRef) {
		if let ColumnRef::Related { relationship, .. } = column {
			if let Some(rel) = self.schema.relationship(relationship).cloned() {
				self.ensure_join(&rel);
			}
		}
	}

	fn ensure_join(&mut self, rel: &Relationship) {
		if self.projection.is_joined(&rel.name) {
			return;
		}
		self.projection.joins.push(Join {
			relationship: rel.name.clone(),
			table: rel.table().to_string(),
			field: "id".to_string(),
			base_field: rel.via.clone(),
		});
	}
}

fn reject_post_fetch(column: &ColumnRef, reason: &str) -> Result<()> {
	match column {
		ColumnRef::Transformation(t) if t.is_post_fetch() => Err(ComposerError::InvalidTransform {
			alias: t.alias().to_string(),
			reason: reason.to_string(),
		}),
		_ => Ok(()),
	}
}
