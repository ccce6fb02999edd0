use thiserror::Error;

/// Errors raised while loading or saving the persisted document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The document could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes exist but do not decode into a document.
    #[error("Malformed persisted state: {0}")]
    Malformed(String),

    /// A save or load did not finish within the configured bound.
    #[error("Persistence timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The blocking worker running a SQLite call panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Join(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
