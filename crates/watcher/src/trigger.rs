//! Trigger files
//!
//! A build tool that writes many files non-atomically can touch a marker
//! file when it is done. A root with a trigger file holds its pending
//! changes until that marker has changed since the last delivery and then
//! stayed the same for one full poll.

use std::path::{Path, PathBuf};
use treewatch_core::{ChangedFile, FileEntry, Snapshot};

/// Marker file gating delivery for one root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerFile {
    /// Path relative to the root
    path: PathBuf,
}

impl TriggerFile {
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            path: relative_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a change refers to the trigger itself
    pub fn is_trigger(&self, change: &ChangedFile) -> bool {
        change.path() == self.path
    }

    /// Whether held changes may be released
    ///
    /// The trigger must differ from `baseline` (it was touched since the
    /// last delivery) and match `previous` (the poll before `latest`), so
    /// it has stopped changing.
    pub fn is_ready(&self, baseline: &Snapshot, previous: Option<&Snapshot>, latest: &Snapshot) -> bool {
        let current = latest.get(&self.path);
        let touched = fingerprint_differs(baseline.get(&self.path), current);
        let settled = previous.is_some_and(|previous| !fingerprint_differs(previous.get(&self.path), current));
        touched && settled
    }
}

fn fingerprint_differs(before: Option<&FileEntry>, after: Option<&FileEntry>) -> bool {
    match (before, after) {
        (Some(before), Some(after)) => after.is_modified_from(before),
        (None, None) => false,
        _ => true,
    }
}
