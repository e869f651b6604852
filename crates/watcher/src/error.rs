//! Error types for the watcher

use std::path::PathBuf;
use thiserror::Error;
use treewatch_core::SnapshotError;

use crate::watcher::WatcherState;

/// Errors surfaced synchronously by watcher construction and lifecycle calls
///
/// Failures inside the poll loop never show up here; they are logged.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid watch root: {0}")]
    InvalidRoot(#[from] SnapshotError),

    #[error("Invalid watcher configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to load ignore rules for {}: {source}", root.display())]
    IgnoreRules {
        root: PathBuf,
        #[source]
        source: ::ignore::Error,
    },

    #[error("Watcher is already {0}")]
    AlreadyStarted(WatcherState),

    #[error("Watcher has been stopped and cannot be restarted")]
    Terminated,

    #[error("Failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}
