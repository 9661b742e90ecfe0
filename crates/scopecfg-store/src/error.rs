//! Error types for store operations.

/// Errors returned by variable stores and catalogs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite engine error.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    /// Stored data could not be decoded.
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    /// Database schema version is not supported.
    #[error("unsupported store schema version: {0}")]
    UnsupportedSchema(i64),
    /// A write referenced a catalog entry that does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),
    /// A blocking database task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
