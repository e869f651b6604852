//! File entries recorded in a snapshot

use crate::error::{Result, SnapshotError};
use crate::hash::{hash_file, Blake3Hash};
use crate::snapshot::{FingerprintMode, SnapshotOptions};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// Metadata for one regular file under a snapshot root
///
/// Modification times come straight from the filesystem. Some filesystems
/// only keep one-second granularity, so two quick edits that leave the size
/// unchanged can look identical unless content hashing is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileEntry {
    /// Path relative to the snapshot root
    relative_path: PathBuf,
    /// Size in bytes
    size: u64,
    /// Last modification time
    modified: SystemTime,
    /// BLAKE3 of the content, only in content-hash mode
    content_hash: Option<Blake3Hash>,
}

impl FileEntry {
    /// Create a new entry from metadata
    pub fn new(relative_path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        Self {
            relative_path: relative_path.into(),
            size,
            modified,
            content_hash: None,
        }
    }

    /// Attach a content hash
    pub fn with_content_hash(mut self, hash: Blake3Hash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn content_hash(&self) -> Option<Blake3Hash> {
        self.content_hash
    }

    /// Whether this entry describes different content than `other`
    ///
    /// Content hashes only take part when both sides carry one.
    pub fn is_modified_from(&self, other: &FileEntry) -> bool {
        if self.size != other.size || self.modified != other.modified {
            return true;
        }
        match (self.content_hash, other.content_hash) {
            (Some(ours), Some(theirs)) => ours != theirs,
            _ => false,
        }
    }
}

/// Stat (and optionally hash) one listed file
///
/// Returns `Ok(None)` when the file vanished or stopped being a regular file
/// between listing and stat. Editors and build tools do this constantly.
pub(crate) fn read_entry(
    root: &Path,
    path: &Path,
    options: &SnapshotOptions,
) -> Result<Option<FileEntry>> {
    let metadata = if options.follow_links {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };

    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            trace!(path = %path.display(), "File vanished before stat, skipping");
            return Ok(None);
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let modified = metadata.modified().map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let relative_path = path
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf());

    let entry = FileEntry::new(relative_path, metadata.len(), modified);

    if options.fingerprint == FingerprintMode::ContentHash {
        return match hash_file(path) {
            Ok(hash) => Ok(Some(entry.with_content_hash(hash))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "File vanished before hashing, skipping");
                Ok(None)
            }
            Err(source) => Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }),
        };
    }

    Ok(Some(entry))
}
