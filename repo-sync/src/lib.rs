//! # Repository Sync
//!
//! This crate keeps a bounded registry of monitored repositories on top of
//! the repository watcher and fans normalized change notifications out as
//! [`SyncMessage`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Sync Coordinator                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  add/remove ──► Registry ──► FileWatcher                        │
//! │                    │              │                             │
//! │                    │              ▼                             │
//! │                    │       WatcherSignal                        │
//! │                    │              │                             │
//! │                    └──────► Translator ──► SyncMessage          │
//! │                                                 │               │
//! │                                                 ▼               │
//! │                                           Broadcaster           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskwatch_repo_sync::{ChannelBroadcaster, SyncConfig, SyncCoordinator};
//!
//! let broadcaster = Arc::new(ChannelBroadcaster::default());
//! let mut messages = broadcaster.subscribe();
//!
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), broadcaster);
//! coordinator.initialize().await?;
//! coordinator.add_repository("/work/app").await?;
//!
//! while let Ok(message) = messages.recv().await {
//!     println!("{}", serde_json::to_string(&message)?);
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod message;

pub use broadcaster::{Broadcaster, ChannelBroadcaster};
pub use config::SyncConfig;
pub use coordinator::{AddOutcome, CoordinatorStats, RejectReason, RemoveOutcome, SyncCoordinator};
pub use error::{Result, SyncError};
pub use message::{
    LifecyclePayload, SyncEvent, SyncMessage, SyncPayload, TasksErrorPayload,
    TasksUpdatedPayload, UNKNOWN_REPOSITORY,
};

pub use taskwatch_repo_watcher::{ChangeKind, ContentReader, JsonContentReader, WatcherStats};
