//! Error types for snapshot capture and diffing

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from snapshot operations
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The root handed to a snapshot is empty, missing, or not a directory
    #[error("path must be a directory: '{}'", path.display())]
    InvalidArgument { path: PathBuf },

    /// Two snapshots of different roots were compared
    #[error(
        "snapshot source folder must be '{}' (got '{}')",
        expected.display(),
        actual.display()
    )]
    SourceMismatch { expected: PathBuf, actual: PathBuf },

    /// Filesystem access failed while walking the tree
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
