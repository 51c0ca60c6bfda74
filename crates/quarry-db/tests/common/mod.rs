//! Shared fixtures: a `User`/`Post` schema pair and a recording backend

#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use quarry_db::backends::{DatabaseBackend, QueryResult, Result as DbResult};
use quarry_db::prelude::*;
use std::sync::Arc;

pub static USER_SCHEMA: Lazy<Arc<ModelSchema>> = Lazy::new(|| {
	ModelSchema::builder("User", "users")
		.column("id", ColumnType::Serial)
		.column("name", ColumnType::String)
		.column("karma", ColumnType::Int)
		.aggregate("karma", AggregateExpr::Max)
		.aggregate("id", AggregateExpr::Count)
		.build()
});

pub static POST_SCHEMA: Lazy<Arc<ModelSchema>> = Lazy::new(|| {
	ModelSchema::builder("Post", "posts")
		.column("id", ColumnType::Serial)
		.column("user_id", ColumnType::Int)
		.column("title", ColumnType::String)
		.column("views", ColumnType::Int)
		.belongs_to("user", USER_SCHEMA.clone(), "user_id")
		.aggregate("id", AggregateExpr::Count)
		.aggregate("views", AggregateExpr::Sum)
		.external_interface(["id", "title"])
		.build()
});

#[derive(Debug, Clone, PartialEq)]
pub struct User {
	pub id: i64,
	pub name: String,
	pub karma: i64,
}

impl Model for User {
	fn schema() -> Arc<ModelSchema> {
		USER_SCHEMA.clone()
	}

	fn from_row(row: &Row, _persisted: bool) -> Result<Self, DatabaseError> {
		Ok(Self {
			id: row.get("id")?,
			name: row.get("name")?,
			karma: row.get("karma")?,
		})
	}

	fn id(&self) -> Option<QueryValue> {
		Some(QueryValue::Int(self.id))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
	pub id: i64,
	pub user_id: i64,
	pub title: String,
	pub views: i64,
	pub persisted: bool,
}

impl Model for Post {
	fn schema() -> Arc<ModelSchema> {
		POST_SCHEMA.clone()
	}

	fn from_row(row: &Row, persisted: bool) -> Result<Self, DatabaseError> {
		Ok(Self {
			id: row.get("id")?,
			user_id: row.get("user_id")?,
			title: row.get("title")?,
			views: row.get("views")?,
			persisted,
		})
	}

	fn id(&self) -> Option<QueryValue> {
		Some(QueryValue::Int(self.id))
	}
}

/// Backend that records every statement and answers from a script
pub struct MockBackend {
	database_type: DatabaseType,
	responses: Mutex<Vec<DbResult<Vec<Row>>>>,
	pub executed: Mutex<Vec<(String, Vec<QueryValue>)>>,
}

impl MockBackend {
	pub fn new(database_type: DatabaseType) -> Arc<Self> {
		Arc::new(Self {
			database_type,
			responses: Mutex::new(Vec::new()),
			executed: Mutex::new(Vec::new()),
		})
	}

	/// Queue a response; responses are consumed in order, then empty results
	pub fn respond(&self, response: DbResult<Vec<Row>>) {
		self.responses.lock().push(response);
	}

	pub fn statements(&self) -> Vec<String> {
		self.executed.lock().iter().map(|(sql, _)| sql.clone()).collect()
	}
}

#[async_trait]
impl DatabaseBackend for MockBackend {
	fn database_type(&self) -> DatabaseType {
		self.database_type
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> DbResult<QueryResult> {
		self.executed.lock().push((sql.to_string(), params));
		Ok(QueryResult { rows_affected: 0 })
	}

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> DbResult<Vec<Row>> {
		self.executed.lock().push((sql.to_string(), params));
		let mut responses = self.responses.lock();
		if responses.is_empty() {
			Ok(Vec::new())
		} else {
			responses.remove(0)
		}
	}
}

pub fn mock_database(database_type: DatabaseType) -> (Database, Arc<MockBackend>) {
	let backend = MockBackend::new(database_type);
	let connection = DatabaseConnection::new(backend.clone());
	(Database::new(connection), backend)
}

pub fn row<const N: usize>(values: [(&str, QueryValue); N]) -> Row {
	values.into_iter().collect()
}

/// Placeholder numbers in the order they appear, skipping quoted identifiers
pub fn placeholder_numbers(sql: &str, database_type: DatabaseType) -> Vec<usize> {
	let marker = match database_type {
		DatabaseType::Postgres => '$',
		DatabaseType::Sqlite => '?',
	};
	let mut numbers = Vec::new();
	let mut chars = sql.chars().peekable();
	let mut in_identifier = false;
	while let Some(c) = chars.next() {
		if c == '"' {
			in_identifier = !in_identifier;
			continue;
		}
		if in_identifier || c != marker {
			continue;
		}
		let mut digits = String::new();
		while let Some(&d) = chars.peek() {
			if !d.is_ascii_digit() {
				break;
			}
			digits.push(d);
			chars.next();
		}
		if let Ok(n) = digits.parse() {
			numbers.push(n);
		}
	}
	numbers
}
