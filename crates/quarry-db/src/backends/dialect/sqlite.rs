//! SQLite dialect implementation

use async_trait::async_trait;
use sqlx::{Column, SqlitePool, TypeInfo, sqlite::SqliteRow};
use std::sync::Arc;

use super::super::{
	backend::DatabaseBackend,
	error::Result,
	types::{DatabaseType, QueryResult, QueryValue, Row},
};

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// SQLite database backend
pub struct SqliteBackend {
	pool: Arc<SqlitePool>,
}

impl SqliteBackend {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool: Arc::new(pool),
		}
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q QueryValue) -> SqliteQuery<'q> {
		match value {
			QueryValue::Null => query.bind(None::<i64>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s.as_str()),
			QueryValue::Bytes(b) => query.bind(b.as_slice()),
			QueryValue::Timestamp(dt) => query.bind(dt),
			QueryValue::Uuid(u) => query.bind(u.to_string()),
			QueryValue::Json(v) => query.bind(v.to_string()),
			QueryValue::Array(_) => query.bind(value.to_json().to_string()),
		}
	}

	fn build_query<'q>(sql: &'q str, params: &'q [QueryValue]) -> SqliteQuery<'q> {
		params
			.iter()
			.fold(sqlx::query(sql), |query, param| Self::bind_value(query, param))
	}

	/// Values are decoded by storage class, with the declared column type
	/// deciding booleans and timestamps
	fn convert_row(sqlite_row: SqliteRow) -> Result<Row> {
		use sqlx::Row as SqlxRow;
		use sqlx::ValueRef;

		let mut row = Row::new();
		for column in sqlite_row.columns() {
			let column_name = column.name();
			let declared = column.type_info().name().to_ascii_uppercase();

			if sqlite_row.try_get_raw(column.ordinal())?.is_null() {
				row.insert(column_name, QueryValue::Null);
				continue;
			}

			if declared.starts_with("BOOL") {
				if let Ok(value) = sqlite_row.try_get::<bool, _>(column_name) {
					row.insert(column_name, QueryValue::Bool(value));
					continue;
				}
			}

			if declared == "DATETIME" || declared == "TIMESTAMP" {
				if let Ok(value) = sqlite_row.try_get::<chrono::DateTime<chrono::Utc>, _>(column_name)
				{
					row.insert(column_name, QueryValue::Timestamp(value));
					continue;
				}
				if let Ok(value) = sqlite_row.try_get::<chrono::NaiveDateTime, _>(column_name) {
					row.insert(
						column_name,
						QueryValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(
							value,
							chrono::Utc,
						)),
					);
					continue;
				}
			}

			if let Ok(value) = sqlite_row.try_get::<i64, _>(column_name) {
				row.insert(column_name, QueryValue::Int(value));
			} else if let Ok(value) = sqlite_row.try_get::<f64, _>(column_name) {
				row.insert(column_name, QueryValue::Float(value));
			} else if let Ok(value) = sqlite_row.try_get::<String, _>(column_name) {
				row.insert(column_name, QueryValue::String(value));
			} else if let Ok(value) = sqlite_row.try_get::<Vec<u8>, _>(column_name) {
				row.insert(column_name, QueryValue::Bytes(value));
			} else {
				tracing::debug!(column = column_name, "unsupported column type, reading as null");
				row.insert(column_name, QueryValue::Null);
			}
		}
		Ok(row)
	}
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
	fn database_type(&self) -> DatabaseType {
		DatabaseType::Sqlite
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
