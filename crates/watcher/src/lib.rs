//! Poll-based file system watching for Treewatch
//!
//! This crate provides:
//! - A background poller that snapshots each root on a fixed interval
//! - Quiet-period debouncing so bursts of writes arrive as one batch
//! - Optional trigger files that hold a root's changes until a build
//!   tool signals completion
//! - Ignore rules (.gitignore, .watchignore, built-ins)
//! - A listener registry invoked on the poller thread
//!
//! Listeners run synchronously on the watcher's thread. A slow listener
//! delays the next poll, so hand heavy work off (see [`ChannelListener`]).

pub mod config;
pub mod debounce;
pub mod error;
pub mod ignore;
pub mod listener;
pub mod reconcile;
pub mod trigger;
pub mod watcher;

// Re-exports
pub use config::{RootConfig, WatcherConfig};
pub use error::WatchError;
pub use self::ignore::{IgnoreConfig, IgnoreRules};
pub use listener::{ChangeListener, ChannelListener, ListenerRegistry};
pub use watcher::{FileSystemWatcher, WatcherState};

pub use treewatch_core::{
    ChangeBatch, ChangeFilter, ChangeKind, ChangedFile, ChangedFiles, FingerprintMode, Snapshot,
    SnapshotOptions,
};

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
