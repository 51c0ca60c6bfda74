//! Entry point tying a connection to an adapter

use quarry_conf::{QueryConfig, Settings};
use std::fmt;
use std::sync::Arc;

use super::adapter::{Adapter, SqlAdapter};
use super::query::Composer;
use super::schema::Model;
use crate::backends::{DatabaseConnection, Result};

/// Cloneable handle the composer runs against
#[derive(Clone)]
pub struct Database {
	connection: DatabaseConnection,
	adapter: Arc<dyn Adapter>,
	config: QueryConfig,
}

impl Database {
	/// Use the reference adapter for the connection's dialect
	pub fn new(connection: DatabaseConnection) -> Self {
		let adapter = Arc::new(SqlAdapter::new(connection.database_type()));
		Self::with_adapter(connection, adapter)
	}

	pub fn with_adapter(connection: DatabaseConnection, adapter: Arc<dyn Adapter>) -> Self {
		Self {
			connection,
			adapter,
			config: QueryConfig::default(),
		}
	}

	pub fn with_config(mut self, config: QueryConfig) -> Self {
		self.config = config;
		self
	}

	/// Connect with the configured database and pool
	pub async fn from_settings(settings: &Settings) -> Result<Self> {
		let connection = DatabaseConnection::connect(&settings.database, &settings.pool).await?;
		tracing::info!(
			engine = %settings.database.engine,
			database_type = ?connection.database_type(),
			"database ready"
		);
		Ok(Self::new(connection).with_config(settings.query.clone()))
	}

	pub fn connection(&self) -> &DatabaseConnection {
		&self.connection
	}

	pub fn adapter(&self) -> &Arc<dyn Adapter> {
		&self.adapter
	}

	pub fn config(&self) -> &QueryConfig {
		&self.config
	}

	/// Start composing a query over `M`
	pub fn query<M: Model>(&self) -> Composer<M> {
		Composer::new(self.clone())
	}
}

impl fmt::Debug for Database {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Database")
			.field("connection", &self.connection)
			.field("database_type", &self.adapter.database_type())
			.field("config", &self.config)
			.finish()
	}
}
