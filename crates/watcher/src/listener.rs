//! Change listeners and their registry
//!
//! Listeners are called synchronously on the watcher thread with every
//! stable batch. They should return quickly: the next poll waits for them.

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use treewatch_core::ChangeBatch;

/// Receiver of stable change batches
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, batch: &ChangeBatch) -> anyhow::Result<()>;
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeBatch) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(&self, batch: &ChangeBatch) -> anyhow::Result<()> {
        self(batch)
    }
}

/// Listeners registered with a watcher
///
/// Registration is allowed while the watcher is running; a listener added
/// during a delivery first sees the following batch.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver a batch to every listener, returning how many failed
    ///
    /// Errors and panics are logged and never stop delivery to the rest.
    pub fn notify(&self, batch: &ChangeBatch) -> usize {
        self.notify_while(batch, || true)
    }

    /// Deliver a batch, checking `keep_going` before each listener
    ///
    /// Once it returns false the remaining listeners are skipped for this
    /// batch. Used to honour a stop requested by an earlier listener.
    pub fn notify_while(&self, batch: &ChangeBatch, mut keep_going: impl FnMut() -> bool) -> usize {
        // Copy out so listeners can register others without deadlocking
        let listeners: Vec<_> = self.listeners.read().clone();
        debug!(
            listeners = listeners.len(),
            roots = batch.len(),
            files = batch.file_count(),
            "Delivering change batch"
        );

        let mut failures = 0;
        for (index, listener) in listeners.iter().enumerate() {
            if !keep_going() {
                debug!(skipped = listeners.len() - index, "Delivery interrupted");
                break;
            }
            match catch_unwind(AssertUnwindSafe(|| listener.on_change(batch))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(listener = index, error = %format!("{err:#}"), "Change listener failed");
                }
                Err(payload) => {
                    failures += 1;
                    error!(listener = index, panic = panic_message(&*payload), "Change listener panicked");
                }
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}

/// Forwards batches into a tokio channel for async consumers
///
/// Sending never blocks, so it keeps the watcher thread moving.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ChangeBatch>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::UnboundedSender<ChangeBatch>) -> Self {
        Self { tx }
    }

    /// Create a listener together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChangeBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ChangeListener for ChannelListener {
    fn on_change(&self, batch: &ChangeBatch) -> anyhow::Result<()> {
        self.tx
            .send(batch.clone())
            .map_err(|_| anyhow::anyhow!("Change batch receiver dropped"))
    }
}
