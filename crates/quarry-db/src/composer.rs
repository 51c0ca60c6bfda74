//! Query composer
//!
//! Chainable, lazily evaluated queries over a [`Model`]. Each call to
//! [`Composer::filter`] on an already filtered stage opens a new stage that
//! selects from the previous one, so successive filters narrow a result set
//! instead of merging into one WHERE clause.

pub mod adapter;
pub mod aggregate;
pub mod columns;
pub mod database;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod query;
pub mod record;
pub mod schema;
pub mod stage;
pub mod transform;

pub use adapter::{Adapter, MultiFilter, SelectFragment, SqlAdapter};
pub use aggregate::{AggregateExpr, AggregateMap, SqlFormat};
pub use columns::{ColumnRef, ColumnRequest, Join, JoinedColumn, ProjectedColumn, Projection};
pub use database::Database;
pub use error::{ComposerError, Result};
pub use filter::{Comparator, FilterObject, FilterValue, IntoFilterGroups};
pub use flatten::PreparedQuery;
pub use query::Composer;
pub use record::{ComposerRecord, QueryOutcome, ResourceField, ResourceShape};
pub use schema::{ColumnDef, ColumnType, Model, ModelSchema, Relationship};
pub use stage::{Direction, GroupSpec, OrderSpec, Pagination, QueryStage};
pub use transform::{TransformSpec, Transformation};
