//! Error types for the merge engine crate.

use crate::codec::CodecError;
use scopecfg_store::StoreError;
use thiserror::Error;

/// Errors returned by merge engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document could not be flattened or rebuilt.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// Request referenced an application or tag that does not exist.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// API key exists but is outside its validity window.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Store or catalog failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Output rendering failure.
    #[error("render error: {0}")]
    Render(#[from] serde_json::Error),
}
