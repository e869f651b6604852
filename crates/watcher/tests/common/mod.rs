//! Shared helpers for watcher integration tests

use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use treewatch_watcher::{ChangeBatch, ChangeListener};

/// How long a test waits for an expected delivery
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener that keeps every batch it receives
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Arc<Mutex<Vec<ChangeBatch>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<ChangeBatch> {
        self.batches.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Wait until at least `count` batches arrived
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.count() >= count)
    }
}

impl ChangeListener for Recorder {
    fn on_change(&self, batch: &ChangeBatch) -> anyhow::Result<()> {
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}

/// Route watcher logs through the test harness; `RUST_LOG` overrides the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Relative names of every file in a batch, sorted
pub fn file_names(batch: &ChangeBatch) -> Vec<String> {
    let mut names: Vec<String> = batch
        .iter()
        .flat_map(|changes| changes.iter().map(|file| file.relative_name()))
        .collect();
    names.sort();
    names
}
