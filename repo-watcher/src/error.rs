//! Error types for the repository watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the repository watcher.
///
/// Only argument problems and start-time notify failures are returned to the
/// caller. Failures that happen after a watch has started are delivered as
/// [`crate::WatcherSignal::Error`] instead.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Malformed input to a public operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// The OS watch could not be released cleanly.
    #[error("failed to release watch for {path}: {reason}")]
    Release { path: PathBuf, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Reject empty or whitespace-only repository paths.
pub fn validate_repository_path(path: &std::path::Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Err(WatcherError::InvalidArgument(
            "repository path must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}
