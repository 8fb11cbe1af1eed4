//! The live resource behind one watched repository.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Result, WatcherError};
use crate::event::WatchId;

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// A raw notify callback, tagged with the handle that produced it.
#[derive(Debug)]
pub(crate) struct RawEvent {
    pub repository_path: PathBuf,
    pub watch_id: WatchId,
    pub result: notify::Result<notify::Event>,
}

/// Observes one repository's tracked file.
///
/// The tracked file's parent directory is watched non-recursively so that
/// creation, deletion and rename-into-place all reach us. The notify
/// callback only forwards into a channel; it never touches watcher state.
pub(crate) struct WatchHandle {
    repository_path: PathBuf,
    tracked_file_path: PathBuf,
    watch_dir: PathBuf,

    /// `watch_dir` as the OS may report it (macOS resolves `/var`).
    canonical_watch_dir: Option<PathBuf>,

    watch_id: WatchId,
    os_watch: Option<RecommendedWatcher>,
    is_active: bool,

    /// The watched directory went away and took the OS watch with it.
    is_lost: bool,
}

impl WatchHandle {
    /// Register an OS watch for the tracked file.
    pub(crate) fn start(
        repository_path: &Path,
        tracked_file_path: PathBuf,
        raw_tx: mpsc::UnboundedSender<RawEvent>,
    ) -> Result<Self> {
        let watch_id = WatchId(NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed));
        let dir = watch_dir(&tracked_file_path)?.to_path_buf();

        let callback_path = repository_path.to_path_buf();
        let mut os_watch =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                // The receiver is gone only when the watcher itself was dropped.
                let _ = raw_tx.send(RawEvent {
                    repository_path: callback_path.clone(),
                    watch_id,
                    result,
                });
            })?;
        os_watch.watch(&dir, RecursiveMode::NonRecursive)?;

        let canonical_watch_dir = std::fs::canonicalize(&dir).ok().filter(|c| *c != dir);

        Ok(Self {
            repository_path: repository_path.to_path_buf(),
            tracked_file_path,
            watch_dir: dir,
            canonical_watch_dir,
            watch_id,
            os_watch: Some(os_watch),
            is_active: true,
            is_lost: false,
        })
    }

    pub(crate) fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    pub(crate) fn tracked_file_path(&self) -> &Path {
        &self.tracked_file_path
    }

    pub(crate) fn watch_id(&self) -> WatchId {
        self.watch_id
    }

    /// Active and still backed by an OS watch.
    pub(crate) fn is_observing(&self) -> bool {
        self.is_active && !self.is_lost
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.is_lost
    }

    /// Whether `path` names the watched directory itself.
    pub(crate) fn is_watch_dir(&self, path: &Path) -> bool {
        path == self.watch_dir || self.canonical_watch_dir.as_deref() == Some(path)
    }

    /// Record that the OS dropped the watch.
    pub(crate) fn mark_lost(&mut self) {
        self.is_lost = true;
    }

    /// Whether this handle is the live incarnation `watch_id` refers to.
    pub(crate) fn is_live(&self, watch_id: WatchId) -> bool {
        self.is_active && self.watch_id == watch_id
    }

    /// Mark the handle as stopping. Events arriving afterwards are ignored.
    pub(crate) fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Release the OS watch. Blocking; run it off the async workers.
    pub(crate) fn release(mut self) -> Result<()> {
        self.is_active = false;
        let Some(mut os_watch) = self.os_watch.take() else {
            return Ok(());
        };
        if self.is_lost {
            // Nothing left to unwatch; dropping the watcher frees it.
            return Ok(());
        }
        os_watch
            .unwatch(&self.watch_dir)
            .map_err(|e| WatcherError::Release {
                path: self.repository_path.clone(),
                reason: e.to_string(),
            })
    }
}

fn watch_dir(tracked_file_path: &Path) -> Result<&Path> {
    tracked_file_path.parent().ok_or_else(|| {
        WatcherError::Config(format!(
            "tracked file has no parent directory: {}",
            tracked_file_path.display()
        ))
    })
}
