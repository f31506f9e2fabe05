//! Sync error taxonomy

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can end a sync run or a single remote call
#[derive(Error, Debug)]
pub enum SyncError {
    /// No logged-in user, or the user has no usable credential
    #[error("User not authenticated")]
    NotAuthenticated,

    /// The connectivity probe failed
    #[error("Cannot connect to server")]
    Unreachable,

    /// An individual remote call failed (network, timeout, status, body)
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A referenced local record is absent
    #[error("record not found: {0}")]
    NotFound(String),

    /// Local store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The run was cancelled before the next remote call
    #[error("Sync cancelled")]
    Cancelled,

    /// Another run holds the single-flight guard
    #[error("Sync already in progress")]
    AlreadyRunning,
}

impl SyncError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether retrying the same run later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::Unreachable | SyncError::AlreadyRunning
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SyncError::transport(format!("malformed response: {}", err))
        } else {
            SyncError::transport(err.to_string())
        }
    }
}
