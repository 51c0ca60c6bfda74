//! Database backend abstraction

use async_trait::async_trait;

use super::error::Result;
use super::types::{DatabaseType, QueryResult, QueryValue, Row};

/// Core database backend trait
///
/// Statements arrive fully rendered; `params` are bound positionally in the
/// order their placeholders are numbered.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
	fn database_type(&self) -> DatabaseType;

	fn placeholder(&self, index: usize) -> String {
		self.database_type().placeholder(index)
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> Result<QueryResult>;

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> Result<Vec<Row>>;

	async fn fetch_optional(&self, sql: &str, params: Vec<QueryValue>) -> Result<Option<Row>> {
		Ok(self.fetch_all(sql, params).await?.into_iter().next())
	}
}
