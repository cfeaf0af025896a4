//! Error taxonomy shared by the scheduler, the manager and the SQLite store.

/// Review error type
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// Caller supplied a value outside the accepted domain (e.g. quality > 5)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Item or review state does not exist, or is owned by someone else
    #[error("Not found: {0}")]
    NotFound(String),
    /// Concurrent modification detected during read-modify-write
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
