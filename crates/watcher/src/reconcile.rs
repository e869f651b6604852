//! Baseline reconciliation for watched roots
//!
//! Each root keeps three snapshots: the baseline (state at the last
//! delivery), the previous poll, and the latest poll. Pending changes are
//! always `diff(baseline, latest)`, so edits that cancel out before
//! delivery vanish and a path is never reported twice.

use crate::debounce::QuietPeriod;
use crate::ignore::IgnoreRules;
use crate::trigger::TriggerFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};
use treewatch_core::{diff, ChangeBatch, ChangeFilter, ChangedFile, ChangedFiles, Snapshot, SnapshotOptions};

/// Outcome of scanning one root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First successful capture, adopted as the baseline
    Baseline,
    /// Nothing reportable changed since the previous poll
    Unchanged,
    /// Something reportable changed since the previous poll
    Changed,
    /// Capture failed; treated as no change until the next poll
    Failed,
}

/// Snapshot state for one root
pub struct RootTracker {
    root: PathBuf,
    options: SnapshotOptions,
    filters: Vec<Arc<dyn ChangeFilter>>,
    trigger: Option<TriggerFile>,
    ignore: Option<Arc<IgnoreRules>>,
    baseline: Option<Arc<Snapshot>>,
    previous: Option<Arc<Snapshot>>,
    latest: Option<Arc<Snapshot>>,
}

impl RootTracker {
    pub fn new(
        root: PathBuf,
        options: SnapshotOptions,
        filters: Vec<Arc<dyn ChangeFilter>>,
        trigger: Option<TriggerFile>,
    ) -> Self {
        Self {
            root,
            options,
            filters,
            trigger,
            ignore: None,
            baseline: None,
            previous: None,
            latest: None,
        }
    }

    /// Filter with `rules` and re-read them whenever an ignore file changes
    pub fn with_ignore_rules(mut self, rules: Arc<IgnoreRules>) -> Self {
        self.filters.insert(0, Arc::clone(&rules) as Arc<dyn ChangeFilter>);
        self.ignore = Some(rules);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_deref()
    }

    /// Capture a fresh snapshot and compare it with the previous poll
    pub fn scan(&mut self) -> ScanOutcome {
        let snapshot = match Snapshot::capture_with(&self.root, self.options) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                warn!(root = %self.root.display(), error = %err, "Snapshot failed, retrying next poll");
                return ScanOutcome::Failed;
            }
        };

        let Some(last) = self.latest.take() else {
            debug!(root = %self.root.display(), files = snapshot.len(), "Captured baseline");
            self.baseline = Some(Arc::clone(&snapshot));
            self.latest = Some(snapshot);
            return ScanOutcome::Baseline;
        };

        self.reload_ignore_rules_if_edited(&last, &snapshot);
        let changed = *last != *snapshot && self.has_reportable_changes(&last, &snapshot);

        self.previous = Some(last);
        self.latest = Some(snapshot);

        if changed {
            ScanOutcome::Changed
        } else {
            ScanOutcome::Unchanged
        }
    }

    /// Changes accumulated since the baseline, trigger file excluded
    pub fn pending(&self) -> Option<ChangedFiles> {
        let (baseline, latest) = (self.baseline.as_ref()?, self.latest.as_ref()?);
        let filter = Accepts {
            filters: &self.filters,
            trigger: self.trigger.as_ref(),
        };

        match diff(baseline, latest, Some(&filter)) {
            Ok(changes) if !changes.is_empty() => Some(changes),
            Ok(_) => None,
            Err(err) => {
                warn!(root = %self.root.display(), error = %err, "Failed to diff against baseline");
                None
            }
        }
    }

    /// Whether the trigger policy lets pending changes go
    pub fn is_trigger_ready(&self) -> bool {
        let Some(trigger) = &self.trigger else {
            return true;
        };

        match (&self.baseline, &self.latest) {
            (Some(baseline), Some(latest)) => trigger.is_ready(baseline, self.previous.as_deref(), latest),
            _ => false,
        }
    }

    /// Make the latest snapshot the new baseline
    pub fn adopt_latest(&mut self) {
        if let Some(latest) = &self.latest {
            self.baseline = Some(Arc::clone(latest));
        }
    }

    fn reload_ignore_rules_if_edited(&self, before: &Snapshot, after: &Snapshot) {
        let Some(rules) = &self.ignore else {
            return;
        };

        let edited = [before, after]
            .into_iter()
            .flat_map(Snapshot::entries)
            .map(|entry| entry.relative_path())
            .filter(|path| rules.is_ignore_file(path))
            .any(|path| before.get(path) != after.get(path));

        if edited {
            match rules.reload_ignore_files() {
                Ok(()) => debug!(root = %self.root.display(), "Reloaded ignore rules"),
                Err(err) => {
                    warn!(root = %self.root.display(), error = %err, "Failed to reload ignore rules, keeping previous")
                }
            }
        }
    }

    fn has_reportable_changes(&self, before: &Snapshot, after: &Snapshot) -> bool {
        // The trigger counts here so touching it restarts the quiet period
        let filter = Accepts {
            filters: &self.filters,
            trigger: None,
        };
        diff(before, after, Some(&filter)).map_or(true, |changes| !changes.is_empty())
    }
}

/// Conjunction of a root's filters, optionally hiding its trigger file
struct Accepts<'a> {
    filters: &'a [Arc<dyn ChangeFilter>],
    trigger: Option<&'a TriggerFile>,
}

impl ChangeFilter for Accepts<'_> {
    fn accept(&self, change: &ChangedFile) -> bool {
        if self.trigger.is_some_and(|trigger| trigger.is_trigger(change)) {
            return false;
        }
        self.filters.iter().all(|filter| filter.accept(change))
    }
}

/// All roots of one watcher plus the shared quiet-period timer
pub struct PollSession {
    trackers: Vec<RootTracker>,
    quiet: QuietPeriod,
}

impl PollSession {
    pub fn new(trackers: Vec<RootTracker>, quiet: QuietPeriod) -> Self {
        Self { trackers, quiet }
    }

    pub fn root_count(&self) -> usize {
        self.trackers.len()
    }

    /// Capture the starting baseline of every root
    pub fn initialize(&mut self) {
        for tracker in &mut self.trackers {
            tracker.scan();
        }
    }

    /// Run one poll and return a batch once changes are stable
    pub fn poll(&mut self, now: Instant) -> Option<ChangeBatch> {
        let mut observed = false;
        for tracker in &mut self.trackers {
            if tracker.scan() == ScanOutcome::Changed {
                observed = true;
            }
        }

        if observed {
            self.quiet.record_change(now);
        }

        let mut pending = Vec::new();
        for (index, tracker) in self.trackers.iter_mut().enumerate() {
            match tracker.pending() {
                Some(changes) => pending.push((index, changes)),
                None => tracker.adopt_latest(),
            }
        }

        if pending.is_empty() {
            return None;
        }

        if !self.quiet.is_settled(now) {
            trace!(
                remaining = ?self.quiet.remaining(now),
                "Changes pending, waiting for quiet period"
            );
            return None;
        }

        let mut batch = ChangeBatch::new();
        for (index, changes) in pending {
            let tracker = &mut self.trackers[index];
            if !tracker.is_trigger_ready() {
                debug!(root = %tracker.root().display(), files = changes.len(), "Holding changes until trigger file settles");
                continue;
            }
            tracker.adopt_latest();
            batch.insert(changes);
        }

        (!batch.is_empty()).then_some(batch)
    }
}
