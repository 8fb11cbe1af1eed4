//! Per-key debounce timers.
//!
//! Every raw event for a `(repository, kind)` pair resets that pair's timer.
//! Only a timer that survives the whole window without being replaced or
//! canceled gets to run its callback, so a burst of writes collapses into a
//! single emission for the last write.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::event::{ChangeKind, WatchId};

/// Identifies one debounce timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub repository_path: PathBuf,
    pub kind: ChangeKind,
}

impl DebounceKey {
    pub fn new(repository_path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            repository_path: repository_path.into(),
            kind,
        }
    }
}

/// Result of an explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// A pending timer existed and will never fire.
    Canceled,

    /// There was no pending timer for the key.
    NotFound,
}

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    watch_id: WatchId,
    task: JoinHandle<()>,
}

/// Owns every pending debounce timer, at most one per key.
#[derive(Debug)]
pub struct DebounceScheduler {
    delay: Duration,
    timers: HashMap<DebounceKey, PendingTimer>,
    next_generation: u64,
}

impl DebounceScheduler {
    /// Create a scheduler with the given coalescing window.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// The coalescing window.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start or restart the timer for `key`.
    ///
    /// Any timer already pending for the key is aborted first. `on_fire`
    /// receives the new timer's generation and builds the future that runs
    /// once the window elapses; that future should call [`Self::complete`]
    /// with the generation to confirm it is still the live timer.
    pub fn schedule<F, Fut>(&mut self, key: DebounceKey, watch_id: WatchId, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.timers.remove(&key) {
            previous.task.abort();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.delay;
        let fire = on_fire(generation);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });

        self.timers.insert(
            key,
            PendingTimer {
                generation,
                watch_id,
                task,
            },
        );
        generation
    }

    /// Retire the timer for `key` if `generation` is still the live one.
    ///
    /// Returns the watch id the timer was scheduled for, or `None` when the
    /// timer was replaced or canceled after it fired.
    pub fn complete(&mut self, key: &DebounceKey, generation: u64) -> Option<WatchId> {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key).map(|timer| timer.watch_id)
            }
            _ => None,
        }
    }

    /// Cancel the timer for one key.
    pub fn cancel(&mut self, key: &DebounceKey) -> Cancellation {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.task.abort();
                Cancellation::Canceled
            }
            None => Cancellation::NotFound,
        }
    }

    /// Cancel every timer belonging to a repository. Returns how many were
    /// pending.
    pub fn cancel_repository(&mut self, repository_path: &Path) -> usize {
        let before = self.timers.len();
        self.timers.retain(|key, timer| {
            if key.repository_path == repository_path {
                timer.task.abort();
                false
            } else {
                true
            }
        });
        let canceled = before - self.timers.len();
        if canceled > 0 {
            debug!(
                "Canceled {canceled} pending timer(s) for {}",
                repository_path.display()
            );
        }
        canceled
    }

    /// Cancel every pending timer. Returns how many were pending.
    pub fn cancel_all(&mut self) -> usize {
        let canceled = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
        canceled
    }

    /// Check whether a timer is pending for `key`.
    pub fn is_pending(&self, key: &DebounceKey) -> bool {
        self.timers.contains_key(key)
    }

    /// Number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}
