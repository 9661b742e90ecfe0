//! Config loading errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned while loading or validating scopecfg settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// A config file is not valid JSON5.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    /// Merged values do not fit the settings model.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// An explicitly requested layer does not exist.
    #[error("config file not found: {}", .0.display())]
    MissingLayer(PathBuf),
    /// A setting has an unknown name or an unusable value.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
}
