//! # Repository Watcher
//!
//! This crate observes one tracked data file inside each registered
//! repository and reports debounced, normalized changes to it.
//!
//! ## Features
//!
//! - **Per-repository Watching**: One OS watch per repository, keyed by path
//! - **Debouncing**: Bursts of writes collapse into one event with the last content
//! - **Content Decoding**: Changed files are decoded as JSON, absent when unreadable
//! - **Lifecycle**: Explicit unwatch and shutdown that cancel pending timers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Repository Watcher                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  notify ──► WatchHandle ──► DebounceScheduler ──► ChangeEvent   │
//! │                                   │                    │        │
//! │                                   ▼                    ▼        │
//! │                            ContentReader        WatcherSignal   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod content;
pub mod debounce;
pub mod error;
pub mod event;
mod handle;
pub mod watcher;

pub use config::WatcherConfig;
pub use content::{ContentReader, JsonContentReader};
pub use debounce::{Cancellation, DebounceKey, DebounceScheduler};
pub use error::{Result, WatcherError, validate_repository_path};
pub use event::{ChangeEvent, ChangeKind, ObserverError, WatchId, WatcherSignal};
pub use watcher::{FileWatcher, WatchOutcome, WatcherStats};
