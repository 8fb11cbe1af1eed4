//! Outward sync messages delivered to the broadcaster.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskwatch_repo_watcher::{ChangeEvent, ChangeKind, ObserverError};

/// Repository path used when an error carries no path context.
pub const UNKNOWN_REPOSITORY: &str = "unknown";

/// The closed set of outward events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    RepositoryAdded,
    RepositoryRemoved,
    TasksUpdated,
    TasksError,
}

/// Payload of a `TASKS_UPDATED` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksUpdatedPayload {
    pub change_type: ChangeKind,
    pub file_path: PathBuf,

    /// Decoded tracked file. Absent when it could not be read or decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// Payload of a `TASKS_ERROR` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksErrorPayload {
    pub error: String,
}

/// Payload of repository lifecycle messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePayload {
    pub message: String,
}

/// Event-specific message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncPayload {
    TasksUpdated(TasksUpdatedPayload),
    TasksError(TasksErrorPayload),
    Lifecycle(LifecyclePayload),
}

/// A message fanned out to subscribers.
///
/// Serializes as:
///
/// ```json
/// {
///   "event": "TASKS_UPDATED",
///   "repositoryPath": "/work/app",
///   "timestamp": "2024-05-01T12:00:00Z",
///   "payload": { "changeType": "change", "filePath": "...", "content": {} }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub event: SyncEvent,
    pub repository_path: String,
    pub timestamp: DateTime<Utc>,
    pub payload: SyncPayload,
}

impl SyncMessage {
    /// A repository started being monitored.
    pub fn repository_added(repository_path: &Path) -> Self {
        Self {
            event: SyncEvent::RepositoryAdded,
            repository_path: display_path(repository_path),
            timestamp: Utc::now(),
            payload: SyncPayload::Lifecycle(LifecyclePayload {
                message: "Repository added to monitoring".to_string(),
            }),
        }
    }

    /// A repository stopped being monitored.
    pub fn repository_removed(repository_path: &Path) -> Self {
        Self {
            event: SyncEvent::RepositoryRemoved,
            repository_path: display_path(repository_path),
            timestamp: Utc::now(),
            payload: SyncPayload::Lifecycle(LifecyclePayload {
                message: "Repository removed from monitoring".to_string(),
            }),
        }
    }

    /// The tracked file of a repository changed.
    pub fn tasks_updated(event: &ChangeEvent) -> Self {
        Self {
            event: SyncEvent::TasksUpdated,
            repository_path: display_path(&event.repository_path),
            timestamp: event.timestamp,
            payload: SyncPayload::TasksUpdated(TasksUpdatedPayload {
                change_type: event.kind,
                file_path: event.file_path.clone(),
                content: event.content.clone(),
            }),
        }
    }

    /// Watching a repository failed.
    pub fn tasks_error(error: &ObserverError) -> Self {
        let repository_path = error
            .repository_path
            .as_deref()
            .map_or_else(|| UNKNOWN_REPOSITORY.to_string(), display_path);

        Self {
            event: SyncEvent::TasksError,
            repository_path,
            timestamp: error.timestamp,
            payload: SyncPayload::TasksError(TasksErrorPayload {
                error: error.message.clone(),
            }),
        }
    }

    /// The `TASKS_UPDATED` payload, if this is one.
    pub fn tasks_updated_payload(&self) -> Option<&TasksUpdatedPayload> {
        match &self.payload {
            SyncPayload::TasksUpdated(payload) => Some(payload),
            _ => None,
        }
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
