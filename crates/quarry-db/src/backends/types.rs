//! Common type definitions for database abstraction

use super::error::DatabaseError;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
	Postgres,
	Sqlite,
}

impl DatabaseType {
	/// Render the bind placeholder for a 1-based parameter index
	///
	/// # Examples
	///
	/// ```
	/// use quarry_db::backends::types::DatabaseType;
	///
	/// assert_eq!(DatabaseType::Postgres.placeholder(3), "$3");
	/// assert_eq!(DatabaseType::Sqlite.placeholder(3), "?3");
	/// ```
	pub fn placeholder(&self, index: usize) -> String {
		match self {
			DatabaseType::Postgres => format!("${}", index),
			DatabaseType::Sqlite => format!("?{}", index),
		}
	}
}

/// Query value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
	Timestamp(chrono::DateTime<chrono::Utc>),
	/// UUID value for PostgreSQL uuid columns
	Uuid(Uuid),
	/// JSON document (PostgreSQL json/jsonb)
	Json(serde_json::Value),
	/// Array value, produced by array aggregates
	Array(Vec<QueryValue>),
}

impl QueryValue {
	pub fn is_null(&self) -> bool {
		matches!(self, QueryValue::Null)
	}

	/// Plain JSON rendering, used when rows are serialized
	pub fn to_json(&self) -> serde_json::Value {
		use serde_json::Value;

		match self {
			QueryValue::Null => Value::Null,
			QueryValue::Bool(b) => Value::Bool(*b),
			QueryValue::Int(i) => Value::from(*i),
			QueryValue::Float(f) => serde_json::Number::from_f64(*f)
				.map(Value::Number)
				.unwrap_or(Value::Null),
			QueryValue::String(s) => Value::String(s.clone()),
			QueryValue::Bytes(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
			QueryValue::Timestamp(dt) => Value::String(dt.to_rfc3339()),
			QueryValue::Uuid(u) => Value::String(u.to_string()),
			QueryValue::Json(v) => v.clone(),
			QueryValue::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
		}
	}

	/// Inverse of [`QueryValue::to_json`] for decoded JSON documents
	pub fn from_json(value: serde_json::Value) -> Self {
		use serde_json::Value;

		match value {
			Value::Null => QueryValue::Null,
			Value::Bool(b) => QueryValue::Bool(b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => QueryValue::Int(i),
				None => n.as_f64().map(QueryValue::Float).unwrap_or(QueryValue::Null),
			},
			Value::String(s) => QueryValue::String(s),
			Value::Array(values) => {
				QueryValue::Array(values.into_iter().map(Self::from_json).collect())
			}
			object @ Value::Object(_) => QueryValue::Json(object),
		}
	}
}

impl From<&str> for QueryValue {
	fn from(s: &str) -> Self {
		QueryValue::String(s.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(s: String) -> Self {
		QueryValue::String(s)
	}
}

impl From<i64> for QueryValue {
	fn from(i: i64) -> Self {
		QueryValue::Int(i)
	}
}

impl From<i32> for QueryValue {
	fn from(i: i32) -> Self {
		QueryValue::Int(i as i64)
	}
}

impl From<f64> for QueryValue {
	fn from(f: f64) -> Self {
		QueryValue::Float(f)
	}
}

impl From<bool> for QueryValue {
	fn from(b: bool) -> Self {
		QueryValue::Bool(b)
	}
}

impl From<Vec<u8>> for QueryValue {
	fn from(b: Vec<u8>) -> Self {
		QueryValue::Bytes(b)
	}
}

impl From<chrono::DateTime<chrono::Utc>> for QueryValue {
	fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
		QueryValue::Timestamp(dt)
	}
}

impl From<Uuid> for QueryValue {
	fn from(u: Uuid) -> Self {
		QueryValue::Uuid(u)
	}
}

impl From<serde_json::Value> for QueryValue {
	fn from(v: serde_json::Value) -> Self {
		QueryValue::Json(v)
	}
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(QueryValue::Null)
	}
}

/// Query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
	pub rows_affected: u64,
}

/// Row from query result
///
/// Columns keep the order in which the statement selected them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
	pub data: IndexMap<String, QueryValue>,
}

impl Row {
	pub fn new() -> Self {
		Self {
			data: IndexMap::new(),
		}
	}

	pub fn insert(&mut self, key: impl Into<String>, value: QueryValue) {
		self.data.insert(key.into(), value);
	}

	/// Remove a column, keeping the order of the remaining ones
	pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
		self.data.shift_remove(key)
	}

	pub fn value(&self, key: &str) -> Option<&QueryValue> {
		self.data.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.data.contains_key(key)
	}

	pub fn columns(&self) -> impl Iterator<Item = &str> {
		self.data.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn get<T: TryFrom<QueryValue>>(&self, key: &str) -> std::result::Result<T, DatabaseError>
	where
		DatabaseError: From<<T as TryFrom<QueryValue>>::Error>,
	{
		self.data
			.get(key)
			.cloned()
			.ok_or_else(|| DatabaseError::ColumnNotFound(key.to_string()))
			.and_then(|v| v.try_into().map_err(Into::into))
	}
}

impl<K: Into<String>> FromIterator<(K, QueryValue)> for Row {
	fn from_iter<I: IntoIterator<Item = (K, QueryValue)>>(iter: I) -> Self {
		Self {
			data: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
		}
	}
}

impl Serialize for Row {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.data.len()))?;
		for (key, value) in &self.data {
			map.serialize_entry(key, &value.to_json())?;
		}
		map.end()
	}
}

// Type conversions for QueryValue
impl TryFrom<QueryValue> for i64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => Ok(i),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to i64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for i32 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => i32::try_from(i)
				.map_err(|_| DatabaseError::TypeError(format!("Value {} out of range for i32", i))),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to i32",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for String {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::String(s) => Ok(s),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to String",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for bool {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Bool(b) => Ok(b),
			// SQLite stores booleans as integers
			QueryValue::Int(i @ (0 | 1)) => Ok(i == 1),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to bool",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for f64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Float(f) => Ok(f),
			QueryValue::Int(i) => Ok(i as f64),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to f64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for chrono::DateTime<chrono::Utc> {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Timestamp(dt) => Ok(dt),
			QueryValue::String(s) => chrono::DateTime::parse_from_rfc3339(&s)
				.map(|dt| dt.with_timezone(&chrono::Utc))
				.map_err(|_| DatabaseError::TypeError(format!("Invalid timestamp string: {}", s))),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to DateTime<Utc>",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for Uuid {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Uuid(u) => Ok(u),
			QueryValue::String(s) => Uuid::parse_str(&s)
				.map_err(|_| DatabaseError::TypeError(format!("Invalid UUID string: {}", s))),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to Uuid",
				value
			))),
		}
	}
}
