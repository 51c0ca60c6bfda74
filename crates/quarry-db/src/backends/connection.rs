//! Database connection management

use quarry_conf::{DatabaseConfig, PoolConfig};
use std::fmt;
use std::sync::Arc;

use super::backend::DatabaseBackend;
use super::error::{DatabaseError, Result};
use super::types::{DatabaseType, QueryResult, QueryValue, Row};

/// Cloneable handle to a pooled database backend
#[derive(Clone)]
pub struct DatabaseConnection {
	backend: Arc<dyn DatabaseBackend>,
}

impl DatabaseConnection {
	pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
		Self { backend }
	}

	/// Connect using settings, picking the backend from the URL scheme
	pub async fn connect(config: &DatabaseConfig, pool: &PoolConfig) -> Result<Self> {
		let url = config.to_url();
		if url.starts_with("sqlite:") {
			#[cfg(feature = "sqlite")]
			return Self::connect_sqlite_with(&url, pool).await;
		} else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
			#[cfg(feature = "postgres")]
			return Self::connect_postgres_with(&url, pool).await;
		}
		Err(DatabaseError::UnsupportedDatabase(format!(
			"no enabled backend for engine {:?}",
			config.engine
		)))
	}

	#[cfg(feature = "postgres")]
	pub async fn connect_postgres(url: &str) -> Result<Self> {
		Self::connect_postgres_with(url, &PoolConfig::default()).await
	}

	#[cfg(feature = "postgres")]
	pub async fn connect_postgres_with(url: &str, pool: &PoolConfig) -> Result<Self> {
		let pg_pool = sqlx::postgres::PgPoolOptions::new()
			.min_connections(pool.min_connections)
			.max_connections(pool.max_connections)
			.acquire_timeout(pool.acquire_timeout())
			.idle_timeout(pool.idle_timeout())
			.max_lifetime(pool.max_lifetime())
			.connect(url)
			.await
			.map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

		tracing::debug!(max_connections = pool.max_connections, "connected to postgres");
		Ok(Self::new(Arc::new(super::dialect::PostgresBackend::new(
			pg_pool,
		))))
	}

	#[cfg(feature = "sqlite")]
	pub async fn connect_sqlite(url: &str) -> Result<Self> {
		Self::connect_sqlite_with(url, &PoolConfig::default()).await
	}

	#[cfg(feature = "sqlite")]
	pub async fn connect_sqlite_with(url: &str, pool: &PoolConfig) -> Result<Self> {
		let options = sqlx::sqlite::SqlitePoolOptions::new();

		// Every connection to an in-memory database opens a fresh database,
		// so the pool must hold exactly one connection for its whole life.
		let options = if url.contains(":memory:") {
			options
				.min_connections(1)
				.max_connections(1)
				.idle_timeout(None)
				.max_lifetime(None)
		} else {
			options
				.min_connections(pool.min_connections)
				.max_connections(pool.max_connections)
				.idle_timeout(pool.idle_timeout())
				.max_lifetime(pool.max_lifetime())
		};

		let sqlite_pool = options
			.acquire_timeout(pool.acquire_timeout())
			.connect(url)
			.await
			.map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

		tracing::debug!(url, "connected to sqlite");
		Ok(Self::new(Arc::new(super::dialect::SqliteBackend::new(
			sqlite_pool,
		))))
	}

	pub fn backend(&self) -> Arc<dyn DatabaseBackend> {
		self.backend.clone()
	}

	pub fn database_type(&self) -> DatabaseType {
		self.backend.database_type()
	}

	pub async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> Result<QueryResult> {
		self.backend.execute(sql, params).await
	}

	pub async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> Result<Vec<Row>> {
		self.backend.fetch_all(sql, params).await
	}

	pub async fn fetch_optional(&self, sql: &str, params: Vec<QueryValue>) -> Result<Option<Row>> {
		self.backend.fetch_optional(sql, params).await
	}
}

impl fmt::Debug for DatabaseConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DatabaseConnection")
			.field("database_type", &self.database_type())
			.finish()
	}
}
