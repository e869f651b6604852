//! Watcher configuration
//!
//! Everything is supplied by the embedding application at construction
//! time. The structs deserialize from any serde format; durations are
//! plain milliseconds (`poll_interval_ms`, `quiet_period_ms`).

use crate::error::WatchError;
use crate::ignore::IgnoreConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use treewatch_core::{ChangeFilter, SnapshotOptions};

/// Default poll interval (1 second)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default quiet period (400 milliseconds)
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(400);

/// Default name of the poller thread
pub const DEFAULT_THREAD_NAME: &str = "treewatch-poller";

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Time between polls (default: 1000ms)
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Silence required before a batch is delivered (default: 400ms)
    #[serde(rename = "quiet_period_ms", with = "duration_ms")]
    pub quiet_period: Duration,

    /// Name of the poller thread
    pub thread_name: String,

    /// Directories to watch
    pub roots: Vec<RootConfig>,

    /// Snapshot capture options
    pub snapshot: SnapshotOptions,

    /// Ignore rules applied to every root (default: none)
    pub ignore: Option<IgnoreConfig>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            quiet_period: DEFAULT_QUIET_PERIOD,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            roots: vec![],
            snapshot: SnapshotOptions::default(),
            ignore: None,
        }
    }
}

impl WatcherConfig {
    /// Configuration watching the given directories with default timings
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(RootConfig::new).collect(),
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: RootConfig) -> Self {
        self.roots.push(root);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn with_snapshot_options(mut self, snapshot: SnapshotOptions) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Check the settings that do not depend on the filesystem
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.poll_interval.is_zero() {
            return Err(WatchError::InvalidConfig {
                reason: "poll interval must be greater than zero".to_string(),
            });
        }
        if self.thread_name.is_empty() {
            return Err(WatchError::InvalidConfig {
                reason: "thread name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One watched directory
#[derive(Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Directory to watch
    pub path: PathBuf,

    /// Marker file (relative to `path`) gating delivery for this root
    #[serde(default)]
    pub trigger_file: Option<PathBuf>,

    /// Extra filter for this root, set programmatically
    #[serde(skip)]
    pub filter: Option<Arc<dyn ChangeFilter>>,
}

impl RootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            trigger_file: None,
            filter: None,
        }
    }

    pub fn with_trigger_file(mut self, trigger_file: impl Into<PathBuf>) -> Self {
        self.trigger_file = Some(trigger_file.into());
        self
    }

    pub fn with_filter(mut self, filter: impl ChangeFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Trigger path relative to `root`
    ///
    /// Absolute trigger paths are accepted when they live inside the root.
    pub(crate) fn relative_trigger(&self, root: &Path) -> Result<Option<PathBuf>, WatchError> {
        let Some(trigger) = &self.trigger_file else {
            return Ok(None);
        };

        let relative = if trigger.is_absolute() {
            trigger.strip_prefix(root).map(Path::to_path_buf).map_err(|_| {
                WatchError::InvalidConfig {
                    reason: format!(
                        "trigger file {} is outside root {}",
                        trigger.display(),
                        root.display()
                    ),
                }
            })?
        } else {
            trigger.clone()
        };

        if relative.as_os_str().is_empty() {
            return Err(WatchError::InvalidConfig {
                reason: format!("trigger file for {} is empty", root.display()),
            });
        }

        Ok(Some(relative))
    }
}

impl From<PathBuf> for RootConfig {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for RootConfig {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl fmt::Debug for RootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootConfig")
            .field("path", &self.path)
            .field("trigger_file", &self.trigger_file)
            .field("filter", &self.filter.as_ref().map(|_| "<filter>"))
            .finish()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
