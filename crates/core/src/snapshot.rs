//! Point-in-time capture of a directory tree
//!
//! A snapshot records size and modification time for every regular file
//! below a root. Directories are walked but never recorded themselves.
//! Entries live in a path-ordered map, so directory listing order never
//! leaks into equality, hashing, or diff output.

use crate::changes::{ChangeFilter, ChangedFiles};
use crate::entry::{read_entry, FileEntry};
use crate::error::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{trace, warn};
use walkdir::WalkDir;

/// How file content is fingerprinted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Size and modification time only
    #[default]
    Metadata,
    /// Size, modification time, and a BLAKE3 hash of the content
    ///
    /// Catches same-size edits inside one mtime tick at the cost of reading
    /// every file on every capture.
    ContentHash,
}

/// Options controlling snapshot capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Fingerprint mode (default: metadata)
    #[serde(default)]
    pub fingerprint: FingerprintMode,

    /// Follow symbolic links (default: false)
    #[serde(default)]
    pub follow_links: bool,
}

/// Immutable capture of one directory tree's file metadata
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: PathBuf,
    entries: BTreeMap<PathBuf, FileEntry>,
    taken_at: SystemTime,
}

impl Snapshot {
    /// Capture a snapshot with default options
    pub fn capture(root: impl AsRef<Path>) -> Result<Self> {
        Self::capture_with(root, SnapshotOptions::default())
    }

    /// Capture a snapshot by walking `root` recursively
    pub fn capture_with(root: impl AsRef<Path>, options: SnapshotOptions) -> Result<Self> {
        let root = validate_root(root.as_ref())?;
        let taken_at = SystemTime::now();
        let mut entries = BTreeMap::new();

        for item in WalkDir::new(&root).follow_links(options.follow_links) {
            let item = match item {
                Ok(item) => item,
                Err(err) if is_vanished(&err) => {
                    trace!(error = %err, "Path vanished during walk, skipping");
                    continue;
                }
                // Unreadable subdirectories and link loops only cost their own subtree
                Err(err) if err.depth() > 0 => {
                    warn!(root = %root.display(), error = %err, "Skipping unreadable entry");
                    continue;
                }
                Err(err) => {
                    let path = err.path().unwrap_or(&root).to_path_buf();
                    return Err(SnapshotError::Io {
                        path,
                        source: err.into(),
                    });
                }
            };

            if !item.file_type().is_file() {
                continue;
            }

            match read_entry(&root, item.path(), &options) {
                Ok(Some(entry)) => {
                    entries.insert(entry.relative_path().to_path_buf(), entry);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "Skipping unreadable file");
                }
            }
        }

        // A root deleted mid-walk leaves a partial listing that would read
        // as mass deletion
        if !root.is_dir() {
            return Err(SnapshotError::Io {
                path: root,
                source: io::Error::new(io::ErrorKind::NotFound, "root vanished during walk"),
            });
        }

        Ok(Self {
            root,
            entries,
            taken_at,
        })
    }

    /// Build a snapshot from explicit entries without touching the filesystem
    ///
    /// A later entry for the same relative path replaces an earlier one.
    pub fn from_entries(root: impl Into<PathBuf>, entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.relative_path().to_path_buf(), entry))
            .collect();

        Self {
            root: root.into(),
            entries,
            taken_at: SystemTime::now(),
        }
    }

    /// Root directory of this snapshot
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// When the capture started
    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    /// Look up an entry by path relative to the root
    pub fn get(&self, relative_path: &Path) -> Option<&FileEntry> {
        self.entries.get(relative_path)
    }

    /// Iterate entries in path order
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Files that changed going from `self` to `updated`
    pub fn changed_files(
        &self,
        updated: &Snapshot,
        filter: Option<&dyn ChangeFilter>,
    ) -> Result<ChangedFiles> {
        crate::diff::diff(self, updated, filter)
    }

    pub(crate) fn entry_map(&self) -> &BTreeMap<PathBuf, FileEntry> {
        &self.entries
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.entries == other.entries
    }
}

impl Eq for Snapshot {}

impl Hash for Snapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.entries.hash(state);
    }
}

/// Check that `path` names an existing directory and make it absolute
pub fn validate_root(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(SnapshotError::InvalidArgument {
            path: path.to_path_buf(),
        });
    }

    let absolute = std::path::absolute(path).map_err(|_| SnapshotError::InvalidArgument {
        path: path.to_path_buf(),
    })?;

    if !absolute.is_dir() {
        return Err(SnapshotError::InvalidArgument { path: absolute });
    }

    Ok(absolute)
}

/// A descendant disappeared between listing its parent and reading it
fn is_vanished(err: &walkdir::Error) -> bool {
    err.depth() > 0
        && err
            .io_error()
            .is_some_and(|io| io.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeKind, ChangedFile};
    use std::collections::hash_map::DefaultHasher;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_folder_structure() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let folder1 = temp_dir.path().join("folder1");
        fs::create_dir_all(&folder1).unwrap();
        fs::write(folder1.join("file1"), b"abc").unwrap();
        fs::write(folder1.join("file2"), b"abc").unwrap();
        temp_dir
    }

    fn hash_of(snapshot: &Snapshot) -> u64 {
        let mut hasher = DefaultHasher::new();
        snapshot.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = Snapshot::capture("").unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidArgument { .. }));
        assert!(err.to_string().contains("path must be a directory"));
    }

    #[test]
    fn test_file_root_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let err = Snapshot::capture(&file).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidArgument { .. }));
    }

    #[test]
    fn test_missing_root_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = Snapshot::capture(temp_dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidArgument { .. }));
    }

    #[test]
    fn test_captures_only_files() {
        let temp_dir = create_test_folder_structure();
        fs::create_dir_all(temp_dir.path().join("empty/deeper")).unwrap();

        let snapshot = Snapshot::capture(temp_dir.path()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(Path::new("folder1/file1")).is_some());
        assert!(snapshot.get(Path::new("folder1/file2")).is_some());
        assert!(snapshot.get(Path::new("empty")).is_none());
        assert_eq!(snapshot.root(), temp_dir.path());
    }

    #[test]
    fn test_equal_when_nothing_has_changed() {
        let temp_dir = create_test_folder_structure();
        let first = Snapshot::capture(temp_dir.path()).unwrap();
        let second = Snapshot::capture(temp_dir.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));
    }

    #[test]
    fn test_not_equal_when_file_added() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("folder1/newfile"), b"").unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        assert_ne!(initial, updated);
    }

    #[test]
    fn test_not_equal_when_file_deleted() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::remove_file(temp_dir.path().join("folder1/file1")).unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        assert_ne!(initial, updated);
    }

    #[test]
    fn test_not_equal_when_file_modified() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("folder1/file1"), b"updatedcontent").unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        assert_ne!(initial, updated);
    }

    #[test]
    fn test_not_equal_when_only_mtime_changes() {
        use filetime::{set_file_mtime, FileTime};

        let temp_dir = create_test_folder_structure();
        let file1 = temp_dir.path().join("folder1/file1");
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        let later = SystemTime::now() + Duration::from_secs(60);
        set_file_mtime(&file1, FileTime::from_system_time(later)).unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        assert_ne!(initial, updated);
    }

    #[test]
    fn test_construction_order_does_not_matter() {
        let now = SystemTime::now();
        let a = FileEntry::new("a.txt", 1, now);
        let b = FileEntry::new("dir/b.txt", 2, now);
        let c = FileEntry::new("z.txt", 3, now);

        let forward = Snapshot::from_entries("/root", vec![a.clone(), b.clone(), c.clone()]);
        let backward = Snapshot::from_entries("/root", vec![c, a, b]);

        assert_eq!(forward, backward);
        assert_eq!(hash_of(&forward), hash_of(&backward));
    }

    #[test]
    fn test_from_entries_keeps_one_entry_per_path() {
        let now = SystemTime::now();
        let snapshot = Snapshot::from_entries(
            "/root",
            vec![FileEntry::new("a.txt", 1, now), FileEntry::new("a.txt", 9, now)],
        );

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(Path::new("a.txt")).unwrap().size(), 9);
    }

    #[test]
    fn test_different_roots_not_equal() {
        let first = create_test_folder_structure();
        let second = create_test_folder_structure();

        let a = Snapshot::capture(first.path()).unwrap();
        let b = Snapshot::capture(second.path()).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_mode_detects_same_metadata_edit() {
        use filetime::{set_file_mtime, FileTime};

        let temp_dir = create_test_folder_structure();
        let file1 = temp_dir.path().join("folder1/file1");
        let pinned = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(600));
        set_file_mtime(&file1, pinned).unwrap();

        let options = SnapshotOptions {
            fingerprint: FingerprintMode::ContentHash,
            ..SnapshotOptions::default()
        };
        let initial = Snapshot::capture_with(temp_dir.path(), options).unwrap();

        // Same size, same mtime, different bytes
        fs::write(&file1, b"xyz").unwrap();
        set_file_mtime(&file1, pinned).unwrap();

        let metadata_only = Snapshot::capture(temp_dir.path()).unwrap();
        let hashed = Snapshot::capture_with(temp_dir.path(), options).unwrap();

        assert_ne!(initial, hashed);
        let changes = initial.changed_files(&hashed, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes.get(Path::new("folder1/file1")).map(ChangedFile::kind),
            Some(ChangeKind::Modify)
        );

        // Metadata mode cannot see this edit
        let metadata_baseline = Snapshot::from_entries(
            initial.root(),
            initial.entries().map(|entry| {
                FileEntry::new(entry.relative_path(), entry.size(), entry.modified())
            }),
        );
        assert!(metadata_baseline
            .changed_files(&metadata_only, None)
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_skipped_when_following_links() {
        let temp_dir = create_test_folder_structure();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("folder1/loop")).unwrap();

        let options = SnapshotOptions {
            follow_links: true,
            ..SnapshotOptions::default()
        };
        let initial = Snapshot::capture_with(temp_dir.path(), options).unwrap();
        assert_eq!(initial.len(), 2);

        fs::write(temp_dir.path().join("new.txt"), b"new").unwrap();
        let updated = Snapshot::capture_with(temp_dir.path(), options).unwrap();

        let changes = initial.changed_files(&updated, None).unwrap();
        assert_eq!(
            changes.get(Path::new("new.txt")).map(ChangedFile::kind),
            Some(ChangeKind::Add)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_skipped_in_content_hash_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = create_test_folder_structure();
        let secret = temp_dir.path().join("folder1/secret");
        fs::write(&secret, b"hidden").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
        // Root can read anything; nothing to check then
        if fs::read(&secret).is_ok() {
            return;
        }

        let options = SnapshotOptions {
            fingerprint: FingerprintMode::ContentHash,
            ..SnapshotOptions::default()
        };
        let snapshot = Snapshot::capture_with(temp_dir.path(), options).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(Path::new("folder1/secret")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed_by_default() {
        let temp_dir = create_test_folder_structure();
        std::os::unix::fs::symlink(
            temp_dir.path().join("folder1/file1"),
            temp_dir.path().join("link"),
        )
        .unwrap();

        let plain = Snapshot::capture(temp_dir.path()).unwrap();
        assert!(plain.get(Path::new("link")).is_none());

        let options = SnapshotOptions {
            follow_links: true,
            ..SnapshotOptions::default()
        };
        let followed = Snapshot::capture_with(temp_dir.path(), options).unwrap();
        assert_eq!(followed.get(Path::new("link")).unwrap().size(), 3);
    }
}
