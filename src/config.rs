//! Configuration for the store.
//!
//! Modeled on the solver's own config-loading convention: a plain `serde`-derived struct,
//! a dedicated `ConfigError`, and a `from_file`/`from_str` pair so callers can either parse
//! an existing TOML document or read one straight off disk.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("configuration error: {0}")]
	Parse(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Returns the default cache directory name used when `location` is empty.
fn default_location() -> String {
	"fcstore-data".to_string()
}

/// Configuration recognized by the store.
///
/// These are the options the host cache engine is expected to pass through at
/// construction time; everything else (serializer, directory provisioning, metrics) is
/// the host's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
	/// Directory the data file lives in. Defaults to [`default_location`] when empty.
	#[serde(default = "default_location")]
	pub location: String,

	/// Name of the cache; the data file is `<location>/<cache_name>.dat`.
	pub cache_name: String,

	/// Positive values activate bounded mode with LRU eviction. Zero or negative values
	/// (the default) mean unbounded.
	#[serde(default)]
	pub max_entries: i64,

	/// Passed through to the purge scheduler; the scheduler itself lives outside this
	/// crate, but the flag is kept here so a single config file can drive both.
	#[serde(default)]
	pub purge_synchronously: bool,
}

impl StoreConfig {
	/// Creates a config for a cache named `cache_name`, store unbounded, at `location`.
	pub fn new(location: impl Into<String>, cache_name: impl Into<String>) -> Self {
		Self {
			location: location.into(),
			cache_name: cache_name.into(),
			max_entries: 0,
			purge_synchronously: false,
		}
	}

	/// Sets the bounded-mode entry cap. Values `<= 0` mean unbounded.
	pub fn with_max_entries(mut self, max_entries: i64) -> Self {
		self.max_entries = max_entries;
		self
	}

	/// Loads configuration from a TOML file at the specified path.
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		content.parse()
	}

	/// Resolves the effective directory, substituting the default when empty.
	pub fn resolved_location(&self) -> String {
		if self.location.trim().is_empty() {
			default_location()
		} else {
			self.location.clone()
		}
	}

	/// Returns `Some(cap)` when bounded mode is active, `None` when unbounded.
	pub fn bounded_cap(&self) -> Option<std::num::NonZeroUsize> {
		if self.max_entries > 0 {
			std::num::NonZeroUsize::new(self.max_entries as usize)
		} else {
			None
		}
	}
}

impl FromStr for StoreConfig {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(toml::from_str(s)?)
	}
}
