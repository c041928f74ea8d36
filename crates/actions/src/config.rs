//! Engine tuning.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Tunables for an [`ActionHub`](crate::ActionHub).
///
/// Every field has a default, so an empty document is a valid configuration:
///
/// ```toml
/// slow_refresh_threshold_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
	/// Recomputation passes slower than this are logged as warnings.
	pub slow_refresh_threshold_ms: u64,
}

/// Returns the default slow-pass threshold in milliseconds.
fn default_slow_refresh_threshold_ms() -> u64 {
	2_000
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			slow_refresh_threshold_ms: default_slow_refresh_threshold_ms(),
		}
	}
}

impl EngineConfig {
	/// Parses a configuration from TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML configuration file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// The slow-pass threshold as a duration.
	pub fn slow_refresh_threshold(&self) -> Duration {
		Duration::from_millis(self.slow_refresh_threshold_ms)
	}
}
