//! PostgreSQL dialect implementation

use async_trait::async_trait;
use sqlx::{Column, PgPool, postgres::PgRow};
use std::sync::Arc;
use uuid::Uuid;

use super::super::{
	backend::DatabaseBackend,
	error::Result,
	types::{DatabaseType, QueryResult, QueryValue, Row},
};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// PostgreSQL database backend
pub struct PostgresBackend {
	pool: Arc<PgPool>,
}

impl PostgresBackend {
	pub fn new(pool: PgPool) -> Self {
		Self {
			pool: Arc::new(pool),
		}
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	fn bind_value<'q>(query: PgQuery<'q>, value: &'q QueryValue) -> PgQuery<'q> {
		match value {
			QueryValue::Null => query.bind(None::<i32>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s),
			QueryValue::Bytes(b) => query.bind(b),
			QueryValue::Timestamp(dt) => query.bind(dt),
			QueryValue::Uuid(u) => query.bind(u),
			QueryValue::Json(v) => query.bind(sqlx::types::Json(v)),
			QueryValue::Array(_) => query.bind(sqlx::types::Json(value.to_json())),
		}
	}

	fn build_query<'q>(sql: &'q str, params: &'q [QueryValue]) -> PgQuery<'q> {
		params
			.iter()
			.fold(sqlx::query(sql), |query, param| Self::bind_value(query, param))
	}

	fn convert_row(pg_row: PgRow) -> Result<Row> {
		use rust_decimal::prelude::ToPrimitive;
		use sqlx::Row as SqlxRow;
		use sqlx::ValueRef;

		let mut row = Row::new();
		for column in pg_row.columns() {
			let column_name = column.name();

			if pg_row.try_get_raw(column.ordinal())?.is_null() {
				row.insert(column_name, QueryValue::Null);
			} else if let Ok(value) = pg_row.try_get::<Uuid, _>(column_name) {
				row.insert(column_name, QueryValue::Uuid(value));
			} else if let Ok(value) = pg_row.try_get::<bool, _>(column_name) {
				row.insert(column_name, QueryValue::Bool(value));
			} else if let Ok(value) = pg_row.try_get::<i64, _>(column_name) {
				row.insert(column_name, QueryValue::Int(value));
			} else if let Ok(value) = pg_row.try_get::<i32, _>(column_name) {
				row.insert(column_name, QueryValue::Int(value as i64));
			} else if let Ok(value) = pg_row.try_get::<i16, _>(column_name) {
				row.insert(column_name, QueryValue::Int(value as i64));
			} else if let Ok(value) = pg_row.try_get::<rust_decimal::Decimal, _>(column_name) {
				// NUMERIC is surfaced as Float
				row.insert(
					column_name,
					value.to_f64().map(QueryValue::Float).unwrap_or(QueryValue::Null),
				);
			} else if let Ok(value) = pg_row.try_get::<f64, _>(column_name) {
				row.insert(column_name, QueryValue::Float(value));
			} else if let Ok(value) = pg_row.try_get::<f32, _>(column_name) {
				row.insert(column_name, QueryValue::Float(value as f64));
			} else if let Ok(value) = pg_row.try_get::<String, _>(column_name) {
				row.insert(column_name, QueryValue::String(value));
			} else if let Ok(value) = pg_row.try_get::<Vec<u8>, _>(column_name) {
				row.insert(column_name, QueryValue::Bytes(value));
			} else if let Ok(value) =
				pg_row.try_get::<chrono::DateTime<chrono::Utc>, _>(column_name)
			{
				row.insert(column_name, QueryValue::Timestamp(value));
			} else if let Ok(value) = pg_row.try_get::<chrono::NaiveDateTime, _>(column_name) {
				row.insert(
					column_name,
					QueryValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(
						value,
						chrono::Utc,
					)),
				);
			} else if let Ok(value) = pg_row.try_get::<serde_json::Value, _>(column_name) {
				row.insert(column_name, QueryValue::Json(value));
			} else if let Some(value) = Self::convert_array(&pg_row, column_name) {
				row.insert(column_name, value);
			} else {
				tracing::debug!(column = column_name, "unsupported column type, reading as null");
				row.insert(column_name, QueryValue::Null);
			}
		}
		Ok(row)
	}

	/// Decode the array types produced by `ARRAY_AGG`
	fn convert_array(pg_row: &PgRow, column_name: &str) -> Option<QueryValue> {
		use rust_decimal::prelude::ToPrimitive;
		use sqlx::Row as SqlxRow;

		fn wrap<T, F: Fn(T) -> QueryValue>(values: Vec<T>, f: F) -> QueryValue {
			QueryValue::Array(values.into_iter().map(f).collect())
		}

		if let Ok(values) = pg_row.try_get::<Vec<Option<i64>>, _>(column_name) {
			return Some(wrap(values, QueryValue::from));
		}
		if let Ok(values) = pg_row.try_get::<Vec<Option<i32>>, _>(column_name) {
			return Some(wrap(values, QueryValue::from));
		}
		if let Ok(values) = pg_row.try_get::<Vec<Option<f64>>, _>(column_name) {
			return Some(wrap(values, QueryValue::from));
		}
		if let Ok(values) = pg_row.try_get::<Vec<Option<rust_decimal::Decimal>>, _>(column_name) {
			return Some(wrap(values, |value| {
				QueryValue::from(value.and_then(|d| d.to_f64()))
			}));
		}
		if let Ok(values) = pg_row.try_get::<Vec<Option<bool>>, _>(column_name) {
			return Some(wrap(values, QueryValue::from));
		}
		if let Ok(values) = pg_row.try_get::<Vec<Option<String>>, _>(column_name) {
			return Some(wrap(values, QueryValue::from));
		}
		if let Ok(values) =
			pg_row.try_get::<Vec<Option<chrono::DateTime<chrono::Utc>>>, _>(column_name)
		{
			return Some(wrap(values, QueryValue::from));
		}
		None
	}
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Postgres
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> Result<QueryResult> {
		let result = Self::build_query(sql, &params)
			.execute(self.pool.as_ref())
			.await?;
		Ok(QueryResult {
			rows_affected: result.rows_affected(),
		})
	}

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> Result<Vec<Row>> {
		let rows = Self::build_query(sql, &params)
			.fetch_all(self.pool.as_ref())
			.await?;
		rows.into_iter().map(Self::convert_row).collect()
	}
}
