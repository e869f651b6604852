//! Background poller and its lifecycle
//!
//! A watcher owns exactly one thread. Every snapshot, diff and listener call
//! for that watcher happens on it, in order. The only state crossing
//! threads is the stop channel and the listener registry.
//!
//! `stop()` is cooperative: the thread notices it while sleeping between
//! polls or right after a poll. A capture of a very large tree delays
//! shutdown until that capture finishes.

use crate::config::{RootConfig, WatcherConfig};
use crate::debounce::QuietPeriod;
use crate::error::WatchError;
use crate::ignore::IgnoreRules;
use crate::listener::{ChangeListener, ListenerRegistry};
use crate::reconcile::{PollSession, RootTracker};
use crate::trigger::TriggerFile;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use treewatch_core::{validate_root, ChangeFilter, SnapshotOptions};

/// Lifecycle state of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WatcherState::Created => "created",
            WatcherState::Running => "running",
            WatcherState::Stopping => "stopping",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// A root with its filters resolved at registration time
struct WatchedRoot {
    path: PathBuf,
    trigger: Option<TriggerFile>,
    ignore: Option<Arc<IgnoreRules>>,
    filter: Option<Arc<dyn ChangeFilter>>,
}

impl WatchedRoot {
    fn resolve(root: RootConfig, config: &WatcherConfig) -> Result<Self, WatchError> {
        let path = validate_root(&root.path)?;
        let trigger = root.relative_trigger(&path)?.map(TriggerFile::new);

        let ignore = match &config.ignore {
            Some(ignore) => {
                let rules = IgnoreRules::load(&path, ignore.clone()).map_err(|source| {
                    WatchError::IgnoreRules {
                        root: path.clone(),
                        source,
                    }
                })?;
                Some(Arc::new(rules))
            }
            None => None,
        };

        Ok(Self {
            path,
            trigger,
            ignore,
            filter: root.filter,
        })
    }

    fn tracker(&self, options: SnapshotOptions) -> RootTracker {
        let tracker = RootTracker::new(
            self.path.clone(),
            options,
            self.filter.iter().cloned().collect(),
            self.trigger.clone(),
        );
        match &self.ignore {
            Some(rules) => tracker.with_ignore_rules(Arc::clone(rules)),
            None => tracker,
        }
    }
}

struct Lifecycle {
    state: WatcherState,
    roots: Vec<WatchedRoot>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Poll-based watcher over one or more directory trees
///
/// Listeners receive a [`ChangeBatch`](treewatch_core::ChangeBatch) once a
/// burst of changes has been quiet for the configured period. They run on
/// the watcher thread and must return quickly.
///
/// An instance runs at most once: after `stop()` a new watcher is needed.
pub struct FileSystemWatcher {
    config: WatcherConfig,
    listeners: Arc<ListenerRegistry>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl FileSystemWatcher {
    /// Create a watcher, validating every configured root
    pub fn new(mut config: WatcherConfig) -> Result<Self, WatchError> {
        config.validate()?;

        let roots = std::mem::take(&mut config.roots)
            .into_iter()
            .map(|root| WatchedRoot::resolve(root, &config))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            listeners: Arc::new(ListenerRegistry::new()),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: WatcherState::Created,
                roots,
                stop_tx: None,
                handle: None,
            })),
        })
    }

    /// Add another root before the watcher starts
    pub fn add_root(&self, root: impl Into<RootConfig>) -> Result<(), WatchError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            WatcherState::Created => {}
            WatcherState::Stopped => return Err(WatchError::Terminated),
            state => return Err(WatchError::AlreadyStarted(state)),
        }

        let root = WatchedRoot::resolve(root.into(), &self.config)?;
        if lifecycle.roots.iter().any(|existing| existing.path == root.path) {
            debug!(root = %root.path.display(), "Root already watched, ignoring");
            return Ok(());
        }
        lifecycle.roots.push(root);
        Ok(())
    }

    /// Register a listener; allowed at any time
    pub fn add_listener(&self, listener: impl ChangeListener + 'static) {
        self.listeners.register(Arc::new(listener));
    }

    pub fn state(&self) -> WatcherState {
        self.lifecycle.lock().state
    }

    /// Watched roots, made absolute
    pub fn roots(&self) -> Vec<PathBuf> {
        self.lifecycle
            .lock()
            .roots
            .iter()
            .map(|root| root.path.clone())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn quiet_period(&self) -> Duration {
        self.config.quiet_period
    }

    /// Start polling on a dedicated thread
    ///
    /// Returns once the initial baselines have been captured, so changes
    /// made after `start()` returns are always reported.
    pub fn start(&self) -> Result<(), WatchError> {
        let ready_rx = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                WatcherState::Created => {}
                WatcherState::Stopped => return Err(WatchError::Terminated),
                state => return Err(WatchError::AlreadyStarted(state)),
            }

            if lifecycle.roots.is_empty() {
                return Err(WatchError::InvalidConfig {
                    reason: "no roots to watch".to_string(),
                });
            }

            let trackers = lifecycle
                .roots
                .iter()
                .map(|root| root.tracker(self.config.snapshot))
                .collect();
            let session = PollSession::new(trackers, QuietPeriod::new(self.config.quiet_period));

            let (stop_tx, stop_rx) = bounded::<()>(1);
            let (ready_tx, ready_rx) = bounded::<()>(1);
            let poller = Poller {
                session,
                listeners: Arc::clone(&self.listeners),
                poll_interval: self.config.poll_interval,
                stop_rx,
                lifecycle: Arc::clone(&self.lifecycle),
            };

            let handle = thread::Builder::new()
                .name(self.config.thread_name.clone())
                .spawn(move || poller.run(ready_tx))
                .map_err(WatchError::Spawn)?;

            lifecycle.state = WatcherState::Running;
            lifecycle.stop_tx = Some(stop_tx);
            lifecycle.handle = Some(handle);
            ready_rx
        };

        // Disconnect means the thread died before signalling; stop() reaps it
        let _ = ready_rx.recv();
        Ok(())
    }

    /// Stop polling and wait for the thread to exit
    ///
    /// No listener runs or starts after this returns. A no-op unless the
    /// watcher is running. Called from inside a listener it only signals the
    /// thread: the remaining listeners of that batch are skipped and the
    /// state stays `Stopping` until the thread has exited.
    pub fn stop(&self) {
        let (stop_tx, handle) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != WatcherState::Running {
                return;
            }
            lifecycle.state = WatcherState::Stopping;
            (lifecycle.stop_tx.take(), lifecycle.handle.take())
        };

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.try_send(());
        }

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("stop() called from the watcher thread; exiting after this delivery");
                return;
            }
            if handle.join().is_err() {
                error!("Watcher thread panicked");
            }
        }

        self.lifecycle.lock().state = WatcherState::Stopped;
    }
}

impl Drop for FileSystemWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for FileSystemWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemWatcher")
            .field("state", &self.state())
            .field("roots", &self.roots())
            .field("poll_interval", &self.config.poll_interval)
            .field("quiet_period", &self.config.quiet_period)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Everything the poller thread owns
struct Poller {
    session: PollSession,
    listeners: Arc<ListenerRegistry>,
    poll_interval: Duration,
    stop_rx: Receiver<()>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Poller {
    fn run(mut self, ready_tx: Sender<()>) {
        self.session.initialize();
        let _ = ready_tx.send(());

        info!(
            roots = self.session.root_count(),
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "File system watcher started"
        );

        loop {
            match self.stop_rx.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let Some(batch) = self.session.poll(Instant::now()) else {
                continue;
            };

            if stop_requested(&self.stop_rx) {
                debug!(files = batch.file_count(), "Stop requested, dropping undelivered batch");
                break;
            }

            self.listeners
                .notify_while(&batch, || !stop_requested(&self.stop_rx));
        }

        self.lifecycle.lock().state = WatcherState::Stopped;
        info!("File system watcher stopped");
    }
}

/// Consumes a pending stop signal; a dropped sender also counts
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Shorthand used by tests and embedders with a single root
impl TryFrom<&Path> for FileSystemWatcher {
    type Error = WatchError;

    fn try_from(root: &Path) -> Result<Self, Self::Error> {
        Self::new(WatcherConfig::new([root]))
    }
}
