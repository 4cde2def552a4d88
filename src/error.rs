//! Error types for the sync engine

use thiserror::Error;

use crate::types::Collection;

/// Result type alias for sync engine operations
pub type Result<T> = std::result::Result<T, EventSyncError>;

/// Main error type for the sync engine
#[derive(Error, Debug)]
pub enum EventSyncError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: i64 },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error(
        "Duplicate binding in {collection}: local records {local_ids:?} all match natural key '{natural_key}'"
    )]
    DuplicateBinding {
        collection: Collection,
        natural_key: String,
        local_ids: Vec<i64>,
    },

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Record sync failed: {0}")]
    RecordSyncFailure(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Sync already running for {0}")]
    SyncInProgress(Collection),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EventSyncError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventSyncError::RateLimited(_) | EventSyncError::RemoteUnavailable(_)
        )
    }

    /// Whether the error ends the whole collection cycle rather than a single record
    pub fn aborts_cycle(&self) -> bool {
        matches!(
            self,
            EventSyncError::RemoteUnavailable(_)
                | EventSyncError::RateLimited(_)
                | EventSyncError::DuplicateBinding { .. }
                | EventSyncError::SyncInProgress(_)
        )
    }

    /// Stable numeric code, used as the CLI exit status and in logs
    pub fn code(&self) -> i32 {
        match self {
            EventSyncError::NotFound { .. } => 2,
            EventSyncError::ConstraintViolation(_) => 3,
            EventSyncError::DuplicateBinding { .. } => 4,
            EventSyncError::RemoteUnavailable(_) | EventSyncError::RateLimited(_) => 5,
            EventSyncError::RecordSyncFailure(_) => 6,
            EventSyncError::SyncInProgress(_) => 7,
            EventSyncError::InvalidInput(_) | EventSyncError::Config(_) => 8,
            _ => 1,
        }
    }

    /// Map a SQLite constraint failure to `ConstraintViolation`, keeping other errors as-is
    pub(crate) fn from_write(err: rusqlite::Error, context: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                EventSyncError::ConstraintViolation(format!(
                    "{}: {}",
                    context,
                    message.as_deref().unwrap_or("constraint failed")
                ))
            }
            other => EventSyncError::Database(other),
        }
    }
}
