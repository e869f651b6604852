//! Change records produced by diffing snapshots

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Type of change to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    /// File exists only in the updated snapshot
    Add,
    /// File exists in both with a different fingerprint
    Modify,
    /// File exists only in the baseline snapshot
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeKind::Add => "ADD",
            ChangeKind::Modify => "MODIFY",
            ChangeKind::Delete => "DELETE",
        };
        f.write_str(label)
    }
}

/// A single changed file, relative to its source folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangedFile {
    path: PathBuf,
    kind: ChangeKind,
}

impl ChangedFile {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Path relative to the source folder
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Relative path with `/` separators on every platform
    pub fn relative_name(&self) -> String {
        self.path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for ChangedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.relative_name())
    }
}

/// Predicate deciding which changes are reported
///
/// Filters run after classification: they can drop a change but never
/// turn one kind into another.
pub trait ChangeFilter: Send + Sync {
    fn accept(&self, change: &ChangedFile) -> bool;
}

impl<F> ChangeFilter for F
where
    F: Fn(&ChangedFile) -> bool + Send + Sync,
{
    fn accept(&self, change: &ChangedFile) -> bool {
        self(change)
    }
}

/// All changes found under one source folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangedFiles {
    source_folder: PathBuf,
    files: BTreeSet<ChangedFile>,
}

impl ChangedFiles {
    pub fn new(source_folder: impl Into<PathBuf>, files: BTreeSet<ChangedFile>) -> Self {
        Self {
            source_folder: source_folder.into(),
            files,
        }
    }

    /// Root directory the changes are relative to
    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }

    pub fn files(&self) -> &BTreeSet<ChangedFile> {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangedFile> {
        self.files.iter()
    }

    /// Look up the change recorded for a relative path
    pub fn get(&self, relative_path: &Path) -> Option<&ChangedFile> {
        self.files.iter().find(|file| file.path() == relative_path)
    }

    /// Changes of one kind
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &ChangedFile> {
        self.files.iter().filter(move |file| file.kind() == kind)
    }

    /// Absolute location of a change from this folder
    pub fn absolute_path(&self, file: &ChangedFile) -> PathBuf {
        self.source_folder.join(file.path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangedFiles {
    type Item = &'a ChangedFile;
    type IntoIter = std::collections::btree_set::Iter<'a, ChangedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Stable set of changes across all roots, delivered to listeners at once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: BTreeSet<ChangedFiles>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one root's changes; empty sets are dropped
    pub fn insert(&mut self, changes: ChangedFiles) {
        if !changes.is_empty() {
            self.changes.insert(changes);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangedFiles> {
        self.changes.iter()
    }

    /// Changes for a single root, if it had any
    pub fn for_root(&self, root: &Path) -> Option<&ChangedFiles> {
        self.changes.iter().find(|changes| changes.source_folder() == root)
    }

    /// Number of roots with changes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed files across every root
    pub fn file_count(&self) -> usize {
        self.changes.iter().map(ChangedFiles::len).sum()
    }
}

impl FromIterator<ChangedFiles> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangedFiles>>(iter: I) -> Self {
        let mut batch = Self::new();
        for changes in iter {
            batch.insert(changes);
        }
        batch
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a ChangedFiles;
    type IntoIter = std::collections::btree_set::Iter<'a, ChangedFiles>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
