//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a performer or delegate action.
///
/// Returned to the caller of `perform` exactly as the performer produced it.
pub type PerformError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when loading [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
