//! Configuration for the sync coordinator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskwatch_repo_watcher::WatcherConfig;
use taskwatch_repo_watcher::config::{DEFAULT_DEBOUNCE_MS, DEFAULT_TRACKED_FILE};

use crate::error::{Result, SyncError};

/// Default registry capacity.
pub const DEFAULT_MAX_REPOSITORIES: usize = 10;

/// Configuration for a [`crate::SyncCoordinator`].
///
/// Every field is optional in serialized form:
///
/// ```toml
/// enabled = true
/// maxRepositories = 10
/// debounceMs = 500
/// trackedFile = ".taskmaster/tasks/tasks.json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Global kill switch. A disabled coordinator never watches anything.
    pub enabled: bool,

    /// Maximum number of repositories monitored at once.
    pub max_repositories: usize,

    /// Coalescing window for file events, in milliseconds.
    pub debounce_ms: u64,

    /// Tracked file path relative to each repository.
    pub tracked_file: PathBuf,
}

impl SyncConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            enabled: true,
            max_repositories: DEFAULT_MAX_REPOSITORIES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            tracked_file: PathBuf::from(DEFAULT_TRACKED_FILE),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Enable or disable monitoring.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the registry capacity.
    pub fn with_max_repositories(mut self, max_repositories: usize) -> Self {
        self.max_repositories = max_repositories;
        self
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

    /// The watcher settings derived from this configuration.
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::new()
            .with_debounce_ms(self.debounce_ms)
            .with_tracked_file(self.tracked_file.clone())
    }

    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.max_repositories == 0 {
            return Err(SyncError::Config(
                "maxRepositories must be at least 1".to_string(),
            ));
        }
        self.watcher_config()
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
