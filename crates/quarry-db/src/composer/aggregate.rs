//! Aggregate expressions and SQL formatters

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// How a column collapses when its statement is grouped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateExpr {
	Sum,
	Avg,
	Min,
	Max,
	Count,
	/// `COUNT(DISTINCT column)`
	Distinct,
	/// Renders `NULL`; the default for columns without a declared aggregate
	None,
	/// SQL template where `{column}` is replaced by the column expression
	Custom(String),
}

impl AggregateExpr {
	/// Render the aggregate around a column expression
	///
	/// # Examples
	///
	/// ```
	/// use quarry_db::composer::AggregateExpr;
	///
	/// assert_eq!(AggregateExpr::Sum.render("\"views\""), "SUM(\"views\")");
	/// assert_eq!(AggregateExpr::None.render("\"title\""), "NULL");
	/// assert_eq!(
	///     AggregateExpr::Custom("STRING_AGG({column}, ', ')".into()).render("\"tag\""),
	///     "STRING_AGG(\"tag\", ', ')"
	/// );
	/// ```
	pub fn render(&self, column: &str) -> String {
		match self {
			AggregateExpr::Sum => format!("SUM({})", column),
			AggregateExpr::Avg => format!("AVG({})", column),
			AggregateExpr::Min => format!("MIN({})", column),
			AggregateExpr::Max => format!("MAX({})", column),
			AggregateExpr::Count => format!("COUNT({})", column),
			AggregateExpr::Distinct => format!("COUNT(DISTINCT {})", column),
			AggregateExpr::None => "NULL".to_string(),
			AggregateExpr::Custom(template) => template.replace("{column}", column),
		}
	}
}

/// Aggregate expression per output column key, used when a stage is grouped
pub type AggregateMap = IndexMap<String, AggregateExpr>;

type FormatFn = dyn Fn(&[String]) -> String + Send + Sync;

/// SQL formatter: receives rendered column expressions, returns one expression
#[derive(Clone)]
pub struct SqlFormat(Arc<FormatFn>);

impl SqlFormat {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(&[String]) -> String + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	pub fn apply(&self, columns: &[String]) -> String {
		(self.0)(columns)
	}
}

impl fmt::Debug for SqlFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SqlFormat(..)")
	}
}

impl PartialEq for SqlFormat {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}
