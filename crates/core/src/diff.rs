//! Structural diff between two snapshots of the same root

use crate::changes::{ChangeFilter, ChangeKind, ChangedFile, ChangedFiles};
use crate::error::{Result, SnapshotError};
use crate::snapshot::Snapshot;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Compute the changes going from `baseline` to `updated`
///
/// Both entry maps are path-ordered, so a single merge pass classifies every
/// path in their union exactly once:
/// - only in `updated` => `Add`
/// - only in `baseline` => `Delete`
/// - in both with a different fingerprint => `Modify`
///
/// The optional filter drops changes after classification. The result only
/// depends on the two snapshots.
pub fn diff(
    baseline: &Snapshot,
    updated: &Snapshot,
    filter: Option<&dyn ChangeFilter>,
) -> Result<ChangedFiles> {
    if baseline.root() != updated.root() {
        return Err(SnapshotError::SourceMismatch {
            expected: baseline.root().to_path_buf(),
            actual: updated.root().to_path_buf(),
        });
    }

    let mut files = BTreeSet::new();
    let mut record = |change: ChangedFile| {
        if filter.map_or(true, |filter| filter.accept(&change)) {
            files.insert(change);
        }
    };

    let mut old = baseline.entry_map().iter().peekable();
    let mut new = updated.entry_map().iter().peekable();

    loop {
        match (old.peek(), new.peek()) {
            (Some((old_path, old_entry)), Some((new_path, new_entry))) => {
                match old_path.cmp(new_path) {
                    Ordering::Less => {
                        record(ChangedFile::new(old_path.as_path(), ChangeKind::Delete));
                        old.next();
                    }
                    Ordering::Greater => {
                        record(ChangedFile::new(new_path.as_path(), ChangeKind::Add));
                        new.next();
                    }
                    Ordering::Equal => {
                        if new_entry.is_modified_from(old_entry) {
                            record(ChangedFile::new(new_path.as_path(), ChangeKind::Modify));
                        }
                        old.next();
                        new.next();
                    }
                }
            }
            (Some((old_path, _)), None) => {
                record(ChangedFile::new(old_path.as_path(), ChangeKind::Delete));
                old.next();
            }
            (None, Some((new_path, _))) => {
                record(ChangedFile::new(new_path.as_path(), ChangeKind::Add));
                new.next();
            }
            (None, None) => break,
        }
    }

    Ok(ChangedFiles::new(baseline.root(), files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FileEntry;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn create_test_folder_structure() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let folder1 = temp_dir.path().join("folder1");
        fs::create_dir_all(&folder1).unwrap();
        fs::write(folder1.join("file1"), b"abc").unwrap();
        fs::write(folder1.join("file2"), b"abc").unwrap();
        temp_dir
    }

    fn kind_of(changes: &ChangedFiles, path: &str) -> Option<ChangeKind> {
        changes.get(Path::new(path)).map(ChangedFile::kind)
    }

    #[test]
    fn test_nothing_changed_is_empty() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        let changes = diff(&initial, &updated, None).unwrap();
        assert!(changes.is_empty());
        assert_eq!(changes.source_folder(), temp_dir.path());
    }

    #[test]
    fn test_added_file_single_add() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("folder1/newfile"), b"").unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        let changes = diff(&initial, &updated, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(kind_of(&changes, "folder1/newfile"), Some(ChangeKind::Add));
    }

    #[test]
    fn test_deleted_file_single_delete() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::remove_file(temp_dir.path().join("folder1/file2")).unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        let changes = diff(&initial, &updated, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(kind_of(&changes, "folder1/file2"), Some(ChangeKind::Delete));
    }

    #[test]
    fn test_overwritten_file_single_modify() {
        let temp_dir = create_test_folder_structure();
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("folder1/file1"), b"updatedcontent").unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        let changes = diff(&initial, &updated, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(kind_of(&changes, "folder1/file1"), Some(ChangeKind::Modify));
    }

    #[test]
    fn test_added_deleted_and_changed() {
        let temp_dir = create_test_folder_structure();
        let folder1 = temp_dir.path().join("folder1");
        let initial = Snapshot::capture(temp_dir.path()).unwrap();

        fs::write(folder1.join("file1"), b"updatedcontent").unwrap();
        fs::remove_file(folder1.join("file2")).unwrap();
        fs::write(folder1.join("newfile"), b"").unwrap();
        let updated = Snapshot::capture(temp_dir.path()).unwrap();

        let changes = initial.changed_files(&updated, None).unwrap();

        assert_eq!(changes.source_folder(), temp_dir.path());
        assert_eq!(changes.len(), 3);
        assert_eq!(kind_of(&changes, "folder1/file1"), Some(ChangeKind::Modify));
        assert_eq!(kind_of(&changes, "folder1/file2"), Some(ChangeKind::Delete));
        assert_eq!(kind_of(&changes, "folder1/newfile"), Some(ChangeKind::Add));
        assert_eq!(
            changes.absolute_path(changes.get(Path::new("folder1/newfile")).unwrap()),
            folder1.join("newfile")
        );
    }

    #[test]
    fn test_different_source_folders_mismatch() {
        let first = create_test_folder_structure();
        let second = create_test_folder_structure();
        let a = Snapshot::capture(first.path()).unwrap();
        let b = Snapshot::capture(second.path()).unwrap();

        let err = diff(&a, &b, None).unwrap_err();
        match err {
            SnapshotError::SourceMismatch { expected, actual } => {
                assert_eq!(expected, first.path());
                assert_eq!(actual, second.path());
            }
            other => panic!("Expected SourceMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_counts_match_partitions() {
        let now = SystemTime::now();
        let later = now + Duration::from_secs(5);

        let baseline = Snapshot::from_entries(
            "/root",
            vec![
                FileEntry::new("a", 1, now),
                FileEntry::new("b", 1, now),
                FileEntry::new("c", 1, now),
                FileEntry::new("d", 1, now),
            ],
        );
        let updated = Snapshot::from_entries(
            "/root",
            vec![
                FileEntry::new("e", 1, now),
                FileEntry::new("d", 1, later),
                FileEntry::new("b", 1, now),
                FileEntry::new("c", 2, now),
                FileEntry::new("f", 1, now),
            ],
        );

        let changes = diff(&baseline, &updated, None).unwrap();

        assert_eq!(changes.of_kind(ChangeKind::Add).count(), 2);
        assert_eq!(changes.of_kind(ChangeKind::Delete).count(), 1);
        assert_eq!(changes.of_kind(ChangeKind::Modify).count(), 2);
        assert_eq!(changes.len(), 5);
        assert!(changes.get(Path::new("b")).is_none());
    }

    #[test]
    fn test_filter_drops_without_reclassifying() {
        let now = SystemTime::now();
        let baseline = Snapshot::from_entries("/root", vec![FileEntry::new("keep.rs", 1, now)]);
        let updated = Snapshot::from_entries(
            "/root",
            vec![
                FileEntry::new("keep.rs", 2, now),
                FileEntry::new("scratch.tmp", 1, now),
            ],
        );

        let no_tmp = |change: &ChangedFile| {
            change.path().extension().map_or(true, |ext| ext != "tmp")
        };
        let changes = diff(&baseline, &updated, Some(&no_tmp)).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(kind_of(&changes, "keep.rs"), Some(ChangeKind::Modify));
    }

    #[test]
    fn test_reverse_diff_swaps_add_and_delete() {
        let now = SystemTime::now();
        let left = Snapshot::from_entries("/root", vec![FileEntry::new("old", 1, now)]);
        let right = Snapshot::from_entries("/root", vec![FileEntry::new("new", 1, now)]);

        let forward = diff(&left, &right, None).unwrap();
        let backward = diff(&right, &left, None).unwrap();

        assert_eq!(kind_of(&forward, "new"), Some(ChangeKind::Add));
        assert_eq!(kind_of(&forward, "old"), Some(ChangeKind::Delete));
        assert_eq!(kind_of(&backward, "new"), Some(ChangeKind::Delete));
        assert_eq!(kind_of(&backward, "old"), Some(ChangeKind::Add));
    }
}
