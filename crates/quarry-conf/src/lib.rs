//! # Quarry Conf
//!
//! Settings for Quarry applications.
//!
//! Settings are read from a TOML file with three tables:
//!
//! ```toml
//! [database]
//! engine = "postgresql"
//! name = "blog"
//! user = "blog"
//! password = "secret"
//! host = "localhost"
//! port = 5432
//!
//! [pool]
//! max_connections = 20
//!
//! [query]
//! log_sql = true
//! slow_query_threshold_ms = 250
//! ```
//!
//! `[pool]` and `[query]` are optional. After loading, the `DATABASE_URL` and
//! `QUARRY_LOG_SQL` environment variables override the file.

pub mod settings;

pub use settings::{DatabaseConfig, PoolConfig, QueryConfig, Settings, SettingsError};
