//! Configuration types for repository watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Default coalescing window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default location of the tracked file, relative to the repository root.
pub const DEFAULT_TRACKED_FILE: &str = ".taskmaster/tasks/tasks.json";

/// Configuration for a [`crate::FileWatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    /// How long a key must be quiet before its event is emitted.
    pub debounce_ms: u64,

    /// Path of the tracked file, relative to each repository root.
    pub tracked_file: PathBuf,
}

impl WatcherConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            tracked_file: PathBuf::from(DEFAULT_TRACKED_FILE),
        }
    }

    /// Set the debounce window.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the tracked file subpath.
    pub fn with_tracked_file(mut self, tracked_file: impl Into<PathBuf>) -> Self {
        self.tracked_file = tracked_file.into();
        self
    }

    /// The debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Resolve the tracked file for a repository.
    pub fn tracked_file_for(&self, repository_path: &Path) -> PathBuf {
        repository_path.join(&self.tracked_file)
    }

    /// Check that the tracked file is a usable relative path.
    pub fn validate(&self) -> Result<()> {
        if self.tracked_file.as_os_str().is_empty() {
            return Err(WatcherError::Config(
                "tracked file path must not be empty".to_string(),
            ));
        }
        if self.tracked_file.is_absolute() {
            return Err(WatcherError::Config(format!(
                "tracked file must be relative to the repository: {}",
                self.tracked_file.display()
            )));
        }
        if self.tracked_file.file_name().is_none() {
            return Err(WatcherError::Config(format!(
                "tracked file must name a file: {}",
                self.tracked_file.display()
            )));
        }
        Ok(())
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}
