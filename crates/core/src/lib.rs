//! Directory snapshots and structural diffing for Treewatch
//!
//! This crate provides:
//! - Point-in-time snapshots of a directory tree's file metadata
//! - An order-independent diff between two snapshots of the same root
//! - Change records (`ChangedFile`, `ChangedFiles`, `ChangeBatch`)
//! - Optional BLAKE3 content fingerprints

pub mod changes;
pub mod diff;
pub mod entry;
pub mod error;
pub mod hash;
pub mod snapshot;

// Re-exports
pub use changes::{ChangeBatch, ChangeFilter, ChangeKind, ChangedFile, ChangedFiles};
pub use diff::diff;
pub use entry::FileEntry;
pub use error::{Result, SnapshotError};
pub use hash::Blake3Hash;
pub use snapshot::{validate_root, FingerprintMode, Snapshot, SnapshotOptions};
