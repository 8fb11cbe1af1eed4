//! Error types for the sync coordinator.

use taskwatch_repo_watcher::WatcherError;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in the sync coordinator.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed input to a public operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted before `initialize()`.
    #[error("sync coordinator not initialized")]
    NotInitialized,

    /// Repository watcher error.
    #[error("watcher error: {0}")]
    Watcher(WatcherError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WatcherError> for SyncError {
    fn from(error: WatcherError) -> Self {
        match error {
            WatcherError::InvalidArgument(message) => Self::InvalidArgument(message),
            other => Self::Watcher(other),
        }
    }
}
