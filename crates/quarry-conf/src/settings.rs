//! Settings loading
//!
//! [`Settings`] is deserialized from TOML and then patched from the
//! environment. Only `[database]` is required.

pub mod database_config;

pub use database_config::DatabaseConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Failed to read settings file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("Invalid settings: {0}")]
	Invalid(String),
}

/// Connection pool configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	pub min_connections: u32,
	pub max_connections: u32,
	pub acquire_timeout_secs: u64,
	pub idle_timeout_secs: Option<u64>,
	pub max_lifetime_secs: Option<u64>,
}

impl PoolConfig {
	pub fn acquire_timeout(&self) -> Duration {
		Duration::from_secs(self.acquire_timeout_secs)
	}

	pub fn idle_timeout(&self) -> Option<Duration> {
		self.idle_timeout_secs.map(Duration::from_secs)
	}

	pub fn max_lifetime(&self) -> Option<Duration> {
		self.max_lifetime_secs.map(Duration::from_secs)
	}
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			min_connections: 0,
			max_connections: 10,
			acquire_timeout_secs: 30,
			idle_timeout_secs: Some(600),
			max_lifetime_secs: Some(1800),
		}
	}
}

/// Query execution configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
	/// Log every executed statement at info level instead of debug
	pub log_sql: bool,

	/// Warn about statements that take longer than this many milliseconds
	pub slow_query_threshold_ms: Option<u64>,
}

impl QueryConfig {
	pub fn slow_query_threshold(&self) -> Option<Duration> {
		self.slow_query_threshold_ms.map(Duration::from_millis)
	}
}

/// Application settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
	pub database: DatabaseConfig,

	#[serde(default)]
	pub pool: PoolConfig,

	#[serde(default)]
	pub query: QueryConfig,
}

impl Settings {
	/// Parse settings from a TOML document without consulting the environment
	///
	/// # Examples
	///
	/// ```
	/// use quarry_conf::Settings;
	///
	/// let settings = Settings::from_toml_str(r#"
	///     [database]
	///     engine = "sqlite"
	///     name = ":memory:"
	/// "#).unwrap();
	///
	/// assert_eq!(settings.database.to_url(), "sqlite::memory:");
	/// assert_eq!(settings.pool.max_connections, 10);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Settings = toml::from_str(source)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Load settings from a TOML file and apply environment overrides
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;

		let mut settings = Self::from_toml_str(&source)?;
		settings.apply_env_overrides()?;
		tracing::debug!(path = %path.display(), "loaded settings");
		Ok(settings)
	}

	/// Apply `DATABASE_URL` and `QUARRY_LOG_SQL` from the process environment
	pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
		self.apply_overrides_from(|key| std::env::var(key).ok())
	}

	/// Apply overrides from an arbitrary variable source
	pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
			tracing::debug!("database url overridden from environment");
			self.database.url = Some(url);
		}

		if let Some(flag) = lookup("QUARRY_LOG_SQL") {
			self.query.log_sql = match flag.to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => true,
				"0" | "false" | "no" | "off" | "" => false,
				other => {
					return Err(SettingsError::Invalid(format!(
						"QUARRY_LOG_SQL must be a boolean, got {:?}",
						other
					)));
				}
			};
		}

		self.validate()
	}

	fn validate(&self) -> Result<(), SettingsError> {
		if self.pool.max_connections == 0 {
			return Err(SettingsError::Invalid(
				"pool.max_connections must be greater than zero".to_string(),
			));
		}
		if self.pool.min_connections > self.pool.max_connections {
			return Err(SettingsError::Invalid(format!(
				"pool.min_connections ({}) exceeds pool.max_connections ({})",
				self.pool.min_connections, self.pool.max_connections
			)));
		}
		if self.database.url.is_none() && self.database.name.is_empty() {
			return Err(SettingsError::Invalid(
				"database.name is required when database.url is not set".to_string(),
			));
		}
		Ok(())
	}
}
