//! Sync coordinator implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use taskwatch_repo_watcher::{
    ContentReader, FileWatcher, JsonContentReader, WatchId, WatcherSignal, WatcherStats,
    validate_repository_path,
};

use crate::broadcaster::Broadcaster;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::message::SyncMessage;

/// Why an add was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The registry already holds `max_repositories` entries.
    CapacityExceeded { max_repositories: usize },
}

/// Outcome of [`SyncCoordinator::add_repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The repository is now monitored. `watching` is false when its tracked
    /// file did not exist, in which case no changes will be reported.
    Added { watching: bool },

    /// The repository was already monitored; nothing was emitted.
    AlreadyMonitored,

    /// The repository was not added.
    Rejected { reason: RejectReason },
}

/// Outcome of [`SyncCoordinator::remove_repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotMonitored,
}

/// Statistics about the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub is_initialized: bool,
    pub enabled: bool,

    /// Number of repositories in the registry.
    pub monitored_repositories: usize,

    /// Exactly what [`FileWatcher::stats`] reports.
    pub watcher_stats: WatcherStats,

    /// Live subscriber count from the broadcaster.
    pub connected_clients: usize,
}

#[derive(Default)]
struct CoordinatorState {
    initialized: bool,

    /// Monitored repositories and the watch each one is served by.
    registry: IndexMap<PathBuf, Option<WatchId>>,

    watcher: Option<FileWatcher>,
    translator: Option<JoinHandle<()>>,
}

/// Registers repositories with a [`FileWatcher`] and turns its signals into
/// [`SyncMessage`]s for the broadcaster.
///
/// All public operations serialize on one lock, so registry changes and
/// message emission for a repository happen in a single order.
pub struct SyncCoordinator {
    config: SyncConfig,
    broadcaster: Arc<dyn Broadcaster>,
    reader: Arc<dyn ContentReader>,
    state: Arc<Mutex<CoordinatorState>>,
}

impl SyncCoordinator {
    /// Create a coordinator that decodes tracked files as JSON.
    pub fn new(config: SyncConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            config,
            broadcaster,
            reader: Arc::new(JsonContentReader),
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    /// Replace the content reader.
    pub fn with_content_reader(mut self, reader: Arc<dyn ContentReader>) -> Self {
        self.reader = reader;
        self
    }

    /// The coordinator configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start the file watcher. Calling this again is a no-op.
    ///
    /// A coordinator whose configuration is disabled stays uninitialized
    /// and inert; queries keep working.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.initialized {
            debug!("Sync coordinator already initialized");
            return Ok(());
        }

        if !self.config.enabled {
            info!("Repository sync is disabled by configuration");
            return Ok(());
        }

        self.config.validate()?;

        let (watcher, signals) =
            FileWatcher::new(self.config.watcher_config(), self.reader.clone())?;
        let translator = tokio::spawn(translate_signals(
            Arc::downgrade(&self.state),
            self.broadcaster.clone(),
            signals,
        ));

        state.watcher = Some(watcher);
        state.translator = Some(translator);
        state.initialized = true;

        info!(
            "Sync coordinator initialized (max {} repositories, {}ms debounce)",
            self.config.max_repositories, self.config.debounce_ms
        );
        Ok(())
    }

    /// Start monitoring a repository.
    pub async fn add_repository(&self, repository_path: impl AsRef<Path>) -> Result<AddOutcome> {
        let repository_path = repository_path.as_ref();
        let mut state = self.state.lock().await;

        if !state.initialized {
            return Err(SyncError::NotInitialized);
        }
        validate_repository_path(repository_path)?;

        if state.registry.contains_key(repository_path) {
            debug!("Repository already monitored: {}", repository_path.display());
            return Ok(AddOutcome::AlreadyMonitored);
        }

        if state.registry.len() >= self.config.max_repositories {
            warn!(
                "Maximum repositories ({}) reached, not monitoring {}",
                self.config.max_repositories,
                repository_path.display()
            );
            return Ok(AddOutcome::Rejected {
                reason: RejectReason::CapacityExceeded {
                    max_repositories: self.config.max_repositories,
                },
            });
        }

        let Some(watcher) = state.watcher.as_ref() else {
            return Err(SyncError::NotInitialized);
        };
        let watch_id = watcher.watch(repository_path).await?.watch_id();

        state.registry.insert(repository_path.to_path_buf(), watch_id);
        self.broadcaster.send(SyncMessage::repository_added(repository_path));

        info!(
            "Monitoring repository {} ({}/{})",
            repository_path.display(),
            state.registry.len(),
            self.config.max_repositories
        );
        Ok(AddOutcome::Added {
            watching: watch_id.is_some(),
        })
    }

    /// Stop monitoring a repository. Removing an unknown repository succeeds.
    pub async fn remove_repository(
        &self,
        repository_path: impl AsRef<Path>,
    ) -> Result<RemoveOutcome> {
        let repository_path = repository_path.as_ref();
        validate_repository_path(repository_path)?;

        let mut state = self.state.lock().await;
        if state.registry.shift_remove(repository_path).is_none() {
            debug!("Repository not monitored: {}", repository_path.display());
            return Ok(RemoveOutcome::NotMonitored);
        }

        if let Some(watcher) = state.watcher.as_ref() {
            if let Err(e) = watcher.unwatch(repository_path).await {
                warn!("Failed to unwatch {}: {e}", repository_path.display());
            }
        }
        self.broadcaster.send(SyncMessage::repository_removed(repository_path));

        info!("Stopped monitoring repository {}", repository_path.display());
        Ok(RemoveOutcome::Removed)
    }

    /// Check whether a repository is monitored.
    pub async fn is_monitoring(&self, repository_path: impl AsRef<Path>) -> bool {
        self.state
            .lock()
            .await
            .registry
            .contains_key(repository_path.as_ref())
    }

    /// Monitored repositories, in the order they were added.
    pub async fn monitored_repositories(&self) -> Vec<PathBuf> {
        self.state.lock().await.registry.keys().cloned().collect()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    /// Get coordinator statistics.
    pub async fn stats(&self) -> CoordinatorStats {
        let state = self.state.lock().await;
        let watcher_stats = match state.watcher.as_ref() {
            Some(watcher) => watcher.stats().await,
            None => WatcherStats::default(),
        };

        CoordinatorStats {
            is_initialized: state.initialized,
            enabled: self.config.enabled,
            monitored_repositories: state.registry.len(),
            watcher_stats,
            connected_clients: self.broadcaster.subscriber_count(),
        }
    }

    /// Remove every repository, stop the watcher and return to the
    /// uninitialized state.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;

        let repositories: Vec<PathBuf> = state.registry.drain(..).map(|(path, _)| path).collect();
        for repository_path in &repositories {
            if let Some(watcher) = state.watcher.as_ref() {
                if let Err(e) = watcher.unwatch(repository_path).await {
                    error!("Failed to unwatch {}: {e}", repository_path.display());
                }
            }
            self.broadcaster.send(SyncMessage::repository_removed(repository_path));
        }

        if let Some(watcher) = state.watcher.take() {
            watcher.shutdown().await;
        }
        if let Some(translator) = state.translator.take() {
            translator.abort();
        }
        state.initialized = false;

        info!(
            "Sync coordinator shut down ({} repositories released)",
            repositories.len()
        );
    }
}

/// Turn watcher signals into outward messages.
///
/// Change events are forwarded only while the registry still maps their
/// repository to the watch that produced them; anything else is left over
/// from a removed or re-added repository.
async fn translate_signals(
    state: Weak<Mutex<CoordinatorState>>,
    broadcaster: Arc<dyn Broadcaster>,
    mut signals: mpsc::UnboundedReceiver<WatcherSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = state.upgrade() else {
            break;
        };
        let state = shared.lock().await;

        match signal {
            WatcherSignal::Change(event) => {
                let current = state.registry.get(&event.repository_path).copied().flatten();
                if current == Some(event.watch_id) {
                    debug!(
                        "Tasks {} in {}",
                        event.kind,
                        event.repository_path.display()
                    );
                    broadcaster.send(SyncMessage::tasks_updated(&event));
                } else {
                    debug!(
                        "Dropping stale {} event for {}",
                        event.kind,
                        event.repository_path.display()
                    );
                }
            }
            WatcherSignal::Error(observer_error) => {
                let message = SyncMessage::tasks_error(&observer_error);
                warn!(
                    "Watcher error for {}: {}",
                    message.repository_path, observer_error.message
                );
                broadcaster.send(message);
            }
        }
    }
    debug!("Signal translation stopped");
}
