//! # Quarry
//!
//! A Django-style web framework core for Rust, built around a chainable
//! query composer.
//!
//! Queries are composed from declarative calls (filter, join, order, group,
//! transform, limit, project) and flattened into one parameterized SQL
//! statement, nesting a SELECT for every filtering stage.
//!
//! ## Feature Flags
//!
//! #### Database Backends
//! - `db-postgres` - PostgreSQL support
//! - `db-sqlite` - SQLite support
//!
//! Both are enabled by default.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use quarry::prelude::*;
//! use std::sync::Arc;
//!
//! struct Post {
//!     id: i64,
//!     title: String,
//! }
//!
//! impl Model for Post {
//!     fn schema() -> Arc<ModelSchema> {
//!         ModelSchema::builder("Post", "posts")
//!             .column("id", ColumnType::Serial)
//!             .column("title", ColumnType::String)
//!             .build()
//!     }
//!
//!     fn from_row(row: &Row, _persisted: bool) -> Result<Self, DatabaseError> {
//!         Ok(Self {
//!             id: row.get("id")?,
//!             title: row.get("title")?,
//!         })
//!     }
//!
//!     fn id(&self) -> Option<QueryValue> {
//!         Some(self.id.into())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_file("quarry.toml")?;
//! let db = Database::from_settings(&settings).await?;
//!
//! let outcome = db
//!     .query::<Post>()
//!     .filter(FilterObject::new().with("title__icontains", "rust"))
//!     .order_by("id", Direction::Desc)?
//!     .limit(10)
//!     .end()
//!     .await;
//!
//! for post in outcome.models.unwrap_or_default() {
//!     println!("{}", post.title);
//! }
//! # Ok(())
//! # }
//! ```

pub use quarry_conf as conf;
pub use quarry_db as db;

pub use quarry_conf::{DatabaseConfig, PoolConfig, QueryConfig, Settings, SettingsError};
pub use quarry_db::{Composer, ComposerError, Database, DatabaseConnection, DatabaseError};

pub mod prelude {
	pub use quarry_conf::Settings;
	pub use quarry_db::prelude::*;
}
