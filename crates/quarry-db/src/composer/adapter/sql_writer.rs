//! SQL Writer helper for constructing SQL strings
//!
//! [`SqlWriter`] builds one statement fragment while numbering placeholders
//! from a starting offset, so fragments of a nested statement share a single
//! global placeholder sequence.

use crate::backends::{DatabaseType, QueryValue};

/// Quote an identifier, doubling embedded quotes
pub fn quote_identifier(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"qualifier"."column"`
pub fn qualified(qualifier: &str, column: &str) -> String {
	format!("{}.{}", quote_identifier(qualifier), quote_identifier(column))
}

#[derive(Debug, Clone)]
pub struct SqlWriter {
	/// The SQL string being constructed
	sql: String,
	/// Parameter values collected during construction
	values: Vec<QueryValue>,
	/// Next parameter index (1-based)
	param_index: usize,
	database_type: DatabaseType,
}

impl SqlWriter {
	/// Create a writer whose first placeholder is `param_offset + 1`
	pub fn new(database_type: DatabaseType, param_offset: usize) -> Self {
		Self {
			sql: String::new(),
			values: Vec::new(),
			param_index: param_offset + 1,
			database_type,
		}
	}

	pub fn push(&mut self, s: &str) {
		self.sql.push_str(s);
	}

	pub fn push_identifier(&mut self, ident: &str) {
		self.sql.push_str(&quote_identifier(ident));
	}

	/// Push a value placeholder and collect the value
	///
	/// NULL is written inline and consumes no parameter; returns the index
	/// used otherwise.
	pub fn push_value(&mut self, value: &QueryValue) -> Option<usize> {
		if value.is_null() {
			self.sql.push_str("NULL");
			return None;
		}

		let index = self.param_index;
		self.sql.push_str(&self.database_type.placeholder(index));
		self.values.push(value.clone());
		self.param_index += 1;
		Some(index)
	}

	/// Push a list of items with a separator
	pub fn push_list<I, T, F>(&mut self, items: I, separator: &str, mut f: F)
	where
		I: IntoIterator<Item = T>,
		F: FnMut(&mut Self, T),
	{
		let mut first = true;
		for item in items {
			if !first {
				self.sql.push_str(separator);
			}
			f(self, item);
			first = false;
		}
	}

	#[cfg(test)]
	fn sql(&self) -> &str {
		&self.sql
	}

	#[cfg(test)]
	fn values(&self) -> &[QueryValue] {
		&self.values
	}

	/// Consume writer and return (SQL, values)
	pub fn finish(self) -> (String, Vec<QueryValue>) {
		(self.sql, self.values)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_placeholders_start_after_offset() {
		let mut writer = SqlWriter::new(DatabaseType::Postgres, 2);
		writer.push_value(&QueryValue::Int(42));
		writer.push(" ");
		writer.push_value(&QueryValue::from("test"));

		let (sql, values) = writer.finish();
		assert_eq!(sql, "$3 $4");
		assert_eq!(values, vec![QueryValue::Int(42), QueryValue::from("test")]);
	}

	#[test]
	fn test_sqlite_numbered_placeholders() {
		let mut writer = SqlWriter::new(DatabaseType::Sqlite, 0);
		assert_eq!(writer.push_value(&QueryValue::Bool(true)), Some(1));
		assert_eq!(writer.sql(), "?1");
	}

	#[test]
	fn test_null_is_inlined() {
		let mut writer = SqlWriter::new(DatabaseType::Postgres, 0);
		assert_eq!(writer.push_value(&QueryValue::Null), None);
		writer.push(", ");
		writer.push_value(&QueryValue::Int(1));

		assert_eq!(writer.sql(), "NULL, $1");
		assert_eq!(writer.values().len(), 1);
	}

	#[test]
	fn test_push_list() {
		let mut writer = SqlWriter::new(DatabaseType::Postgres, 0);
		writer.push_list(["a", "b", "c"], ", ", |w, item| w.push_identifier(item));

		assert_eq!(writer.sql(), "\"a\", \"b\", \"c\"");
	}

	#[test]
	fn test_identifier_quoting() {
		assert_eq!(quote_identifier("user$name"), "\"user$name\"");
		assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
		assert_eq!(qualified("t1", "id"), "\"t1\".\"id\"");
	}
}
