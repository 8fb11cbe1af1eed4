//! Change events emitted by the repository watcher.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// Identifies one incarnation of a watch handle.
///
/// Ids are unique for the lifetime of the process, so a repository that is
/// unwatched and watched again gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(pub(crate) u64);

impl WatchId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Kind of logical change to a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The tracked file appeared.
    #[serde(rename = "add")]
    Added,

    /// The tracked file was written.
    #[serde(rename = "change")]
    Changed,

    /// The tracked file was deleted or moved away.
    #[serde(rename = "remove")]
    Removed,
}

impl ChangeKind {
    /// Classify a raw notify event for the path at `position` in its path list.
    ///
    /// Returns `None` for events that never change the file's content, such
    /// as access or metadata notifications.
    pub fn from_notify(kind: notify::EventKind, position: usize) -> Option<Self> {
        match kind {
            notify::EventKind::Create(_) => Some(Self::Added),
            notify::EventKind::Remove(_) => Some(Self::Removed),
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                ModifyKind::Metadata(_) => None,
                ModifyKind::Name(RenameMode::From) => Some(Self::Removed),
                // Both carries [from, to].
                ModifyKind::Name(RenameMode::Both) if position == 0 => Some(Self::Removed),
                _ => Some(Self::Changed),
            },
            notify::EventKind::Access(_) | notify::EventKind::Any | notify::EventKind::Other => {
                None
            }
        }
    }

    /// Whether events of this kind carry file content.
    pub fn reads_content(self) -> bool {
        !matches!(self, Self::Removed)
    }

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "add",
            Self::Changed => "change",
            Self::Removed => "remove",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A debounced, normalized change to a repository's tracked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// The kind of change.
    pub kind: ChangeKind,

    /// Repository the tracked file belongs to.
    pub repository_path: PathBuf,

    /// Full path of the tracked file.
    pub file_path: PathBuf,

    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,

    /// Handle incarnation that produced the event.
    pub watch_id: WatchId,

    /// Decoded content, absent for removals and unreadable files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Create a new change event stamped with the current time.
    pub fn new(
        kind: ChangeKind,
        repository_path: impl Into<PathBuf>,
        file_path: impl Into<PathBuf>,
        watch_id: WatchId,
    ) -> Self {
        Self {
            kind,
            repository_path: repository_path.into(),
            file_path: file_path.into(),
            timestamp: Utc::now(),
            watch_id,
            content: None,
        }
    }

    /// Attach decoded content.
    pub fn with_content(mut self, content: Option<serde_json::Value>) -> Self {
        self.content = content;
        self
    }
}

/// An OS-level watch failure reported after the watch started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverError {
    /// Repository the failure belongs to, when known.
    pub repository_path: Option<PathBuf>,

    /// Handle incarnation the failure came from, when known.
    pub watch_id: Option<WatchId>,

    /// Human readable description.
    pub message: String,

    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            repository_path: None,
            watch_id: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_repository(
        mut self,
        repository_path: impl Into<PathBuf>,
        watch_id: WatchId,
    ) -> Self {
        self.repository_path = Some(repository_path.into());
        self.watch_id = Some(watch_id);
        self
    }
}

/// Everything the watcher reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherSignal {
    /// A debounced change.
    Change(ChangeEvent),

    /// A watch failure.
    Error(ObserverError),
}
