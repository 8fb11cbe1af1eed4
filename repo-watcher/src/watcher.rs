//! Repository watcher implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::WatcherConfig;
use crate::content::ContentReader;
use crate::debounce::{DebounceKey, DebounceScheduler};
use crate::error::{Result, WatcherError, validate_repository_path};
use crate::event::{ChangeEvent, ChangeKind, ObserverError, WatchId, WatcherSignal};
use crate::handle::{RawEvent, WatchHandle};

/// Outcome of [`FileWatcher::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A new watch was started.
    Started(WatchId),

    /// The repository was already being watched.
    AlreadyWatching(WatchId),

    /// The tracked file does not exist, so nothing is watched.
    Unavailable,
}

impl WatchOutcome {
    /// Id of the live watch, if there is one.
    pub fn watch_id(&self) -> Option<WatchId> {
        match self {
            Self::Started(id) | Self::AlreadyWatching(id) => Some(*id),
            Self::Unavailable => None,
        }
    }
}

/// Statistics about the file watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStats {
    /// Number of watch handles.
    pub watched_count: usize,

    /// Number of handles with a live OS watch.
    pub active_watcher_count: usize,

    /// Number of pending debounce timers.
    pub pending_debounce_count: usize,
}

struct WatchState {
    handles: HashMap<PathBuf, WatchHandle>,
    debounce: DebounceScheduler,
}

struct Shared {
    config: WatcherConfig,
    reader: Arc<dyn ContentReader>,
    state: Mutex<WatchState>,
    signal_tx: mpsc::UnboundedSender<WatcherSignal>,
}

/// Watches the tracked file of each registered repository and emits one
/// debounced [`ChangeEvent`] per logical change.
///
/// After [`FileWatcher::shutdown`] the watcher holds no resources but stays
/// usable; a later [`FileWatcher::watch`] starts from a clean state.
pub struct FileWatcher {
    shared: Arc<Shared>,
    raw_tx: mpsc::UnboundedSender<RawEvent>,
}

impl FileWatcher {
    /// Create a new file watcher and the receiver for its signals.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: WatcherConfig,
        reader: Arc<dyn ContentReader>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatcherSignal>)> {
        config.validate()?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(WatchState {
                handles: HashMap::new(),
                debounce: DebounceScheduler::new(config.debounce()),
            }),
            config,
            reader,
            signal_tx,
        });

        tokio::spawn(pump_raw_events(Arc::downgrade(&shared), raw_rx));

        Ok((Self { shared, raw_tx }, signal_rx))
    }

    /// The watcher configuration.
    pub fn config(&self) -> &WatcherConfig {
        &self.shared.config
    }

    /// Start watching a repository's tracked file.
    pub async fn watch(&self, repository_path: impl AsRef<Path>) -> Result<WatchOutcome> {
        let repository_path = repository_path.as_ref();
        validate_repository_path(repository_path)?;

        if let Some(handle) = self.shared.state.lock().await.handles.get(repository_path) {
            if handle.is_observing() {
                debug!("Already watching: {}", repository_path.display());
                return Ok(WatchOutcome::AlreadyWatching(handle.watch_id()));
            }
        }

        let tracked_file = self.shared.config.tracked_file_for(repository_path);
        match tokio::fs::try_exists(&tracked_file).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "Tracked file not found, not watching {}: {}",
                    repository_path.display(),
                    tracked_file.display()
                );
                return Ok(WatchOutcome::Unavailable);
            }
            Err(e) => {
                warn!(
                    "Cannot access tracked file {}, not watching {}: {e}",
                    tracked_file.display(),
                    repository_path.display()
                );
                return Ok(WatchOutcome::Unavailable);
            }
        }

        let handle = WatchHandle::start(repository_path, tracked_file, self.raw_tx.clone())?;

        let mut state = self.shared.state.lock().await;
        if let Some(existing) = state.handles.get(repository_path) {
            if existing.is_observing() {
                // Another caller won the race; keep theirs.
                let existing_id = existing.watch_id();
                drop(state);
                if let Err(e) = release_handle(handle).await {
                    warn!("{e}");
                }
                return Ok(WatchOutcome::AlreadyWatching(existing_id));
            }
        }

        let watch_id = handle.watch_id();
        state.debounce.cancel_repository(repository_path);
        let replaced = state.handles.insert(repository_path.to_path_buf(), handle);
        drop(state);

        if let Some(lost) = replaced {
            debug!(
                "Replacing lost watch {} on {}",
                lost.watch_id(),
                repository_path.display()
            );
            if let Err(e) = release_handle(lost).await {
                warn!("{e}");
            }
        }
        info!("Started watching {} ({watch_id})", repository_path.display());

        Ok(WatchOutcome::Started(watch_id))
    }

    /// Stop watching a repository.
    ///
    /// Pending timers are canceled before the OS watch is released, and the
    /// release is awaited. Returns `false` if the repository was not watched.
    pub async fn unwatch(&self, repository_path: impl AsRef<Path>) -> Result<bool> {
        let repository_path = repository_path.as_ref();
        validate_repository_path(repository_path)?;

        let handle = {
            let mut state = self.shared.state.lock().await;
            match state.handles.remove(repository_path) {
                Some(mut handle) => {
                    state.debounce.cancel_repository(repository_path);
                    handle.deactivate();
                    handle
                }
                None => {
                    debug!("Not watching: {}", repository_path.display());
                    return Ok(false);
                }
            }
        };

        if let Err(e) = release_handle(handle).await {
            warn!("{e}");
        }
        info!("Stopped watching {}", repository_path.display());

        Ok(true)
    }

    /// Check whether a repository is being watched.
    pub async fn is_watching(&self, repository_path: impl AsRef<Path>) -> bool {
        self.shared
            .state
            .lock()
            .await
            .handles
            .get(repository_path.as_ref())
            .is_some_and(WatchHandle::is_observing)
    }

    /// Currently watched repositories, sorted.
    pub async fn list_watched(&self) -> Vec<PathBuf> {
        let state = self.shared.state.lock().await;
        let mut paths: Vec<PathBuf> = state
            .handles
            .values()
            .filter(|handle| handle.is_observing())
            .map(|handle| handle.repository_path().to_path_buf())
            .collect();
        paths.sort();
        paths
    }

    /// Get statistics about the watcher.
    pub async fn stats(&self) -> WatcherStats {
        let state = self.shared.state.lock().await;

        WatcherStats {
            watched_count: state.handles.len(),
            active_watcher_count: state
                .handles
                .values()
                .filter(|handle| handle.is_observing())
                .count(),
            pending_debounce_count: state.debounce.pending_count(),
        }
    }

    /// Cancel all timers and release every OS watch.
    ///
    /// A release failure for one repository is logged and does not stop the
    /// others from being released.
    pub async fn shutdown(&self) {
        let (handles, canceled) = {
            let mut state = self.shared.state.lock().await;
            let canceled = state.debounce.cancel_all();
            let handles: Vec<WatchHandle> = state
                .handles
                .drain()
                .map(|(_, mut handle)| {
                    handle.deactivate();
                    handle
                })
                .collect();
            (handles, canceled)
        };

        let released = handles.len();
        for handle in handles {
            if let Err(e) = release_handle(handle).await {
                error!("{e}");
            }
        }

        info!("File watcher shut down ({released} watches released, {canceled} timers canceled)");
    }
}

/// Release a handle's OS watch on the blocking pool and wait for it.
async fn release_handle(handle: WatchHandle) -> Result<()> {
    let path = handle.repository_path().to_path_buf();
    tokio::task::spawn_blocking(move || handle.release())
        .await
        .map_err(|e| WatcherError::Release {
            path,
            reason: e.to_string(),
        })?
}

/// Move raw notify callbacks onto the async side.
///
/// Holds only a weak reference so that dropping the [`FileWatcher`] tears
/// everything down and ends this task.
async fn pump_raw_events(shared: Weak<Shared>, mut raw_rx: mpsc::UnboundedReceiver<RawEvent>) {
    while let Some(raw) = raw_rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.dispatch(raw).await;
    }
    debug!("Raw event pump stopped");
}

impl Shared {
    async fn dispatch(self: &Arc<Self>, raw: RawEvent) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(handle) = state
            .handles
            .get_mut(&raw.repository_path)
            .filter(|handle| handle.is_live(raw.watch_id))
        else {
            debug!(
                "Dropping event for stale watch {} on {}",
                raw.watch_id,
                raw.repository_path.display()
            );
            return;
        };
        let tracked_name = handle
            .tracked_file_path()
            .file_name()
            .map(ToOwned::to_owned);

        let event = match raw.result {
            Ok(event) => event,
            Err(e) => {
                warn!("Watch error for {}: {e}", raw.repository_path.display());
                let signal = ObserverError::new(e.to_string())
                    .for_repository(raw.repository_path.clone(), raw.watch_id);
                let _ = self.signal_tx.send(WatcherSignal::Error(signal));
                return;
            }
        };

        let dir_gone = !handle.is_lost()
            && event.paths.iter().enumerate().any(|(position, path)| {
                handle.is_watch_dir(path)
                    && ChangeKind::from_notify(event.kind, position) == Some(ChangeKind::Removed)
            });
        if dir_gone {
            // The OS drops a watch whose directory is deleted or moved.
            handle.mark_lost();
            let message = format!(
                "watched directory was removed: {}",
                handle
                    .tracked_file_path()
                    .parent()
                    .unwrap_or(raw.repository_path.as_path())
                    .display()
            );
            warn!("Lost watch on {}: {message}", raw.repository_path.display());
            let signal = ObserverError::new(message)
                .for_repository(raw.repository_path.clone(), raw.watch_id);
            let _ = self.signal_tx.send(WatcherSignal::Error(signal));
        }

        for (position, path) in event.paths.iter().enumerate() {
            if path.file_name() != tracked_name.as_deref() {
                continue;
            }
            let Some(kind) = ChangeKind::from_notify(event.kind, position) else {
                continue;
            };

            debug!(
                "Raw {kind} event for {} ({:?})",
                raw.repository_path.display(),
                event.kind
            );

            let key = DebounceKey::new(raw.repository_path.clone(), kind);
            let fire_key = key.clone();
            let weak = Arc::downgrade(self);
            state
                .debounce
                .schedule(key, raw.watch_id, move |generation| async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire(fire_key, generation).await;
                    }
                });
        }
    }

    /// Runs when a debounce timer survives its whole window.
    async fn fire(&self, key: DebounceKey, generation: u64) {
        let (watch_id, file_path) = {
            let mut state = self.state.lock().await;
            let Some(watch_id) = state.debounce.complete(&key, generation) else {
                return;
            };
            match state.handles.get(&key.repository_path) {
                Some(handle) if handle.is_live(watch_id) => {
                    (watch_id, handle.tracked_file_path().to_path_buf())
                }
                _ => return,
            }
        };

        let content = if key.kind.reads_content() {
            self.reader.read_decoded(&file_path).await
        } else {
            None
        };

        let state = self.state.lock().await;
        let still_live = state
            .handles
            .get(&key.repository_path)
            .is_some_and(|handle| handle.is_live(watch_id));
        if !still_live {
            debug!(
                "Watch on {} stopped before {} could be emitted",
                key.repository_path.display(),
                key.kind
            );
            return;
        }
        if state.debounce.is_pending(&key) {
            // A newer timer for the same key will emit fresher state.
            return;
        }

        if content.is_none() && key.kind.reads_content() {
            debug!("Content unavailable for {}", file_path.display());
        }

        let event = ChangeEvent::new(key.kind, key.repository_path, file_path, watch_id)
            .with_content(content);
        debug!(
            "Emitting {} for {}",
            event.kind,
            event.repository_path.display()
        );
        if self.signal_tx.send(WatcherSignal::Change(event)).is_err() {
            debug!("No consumer for watcher signals");
        }
    }
}
