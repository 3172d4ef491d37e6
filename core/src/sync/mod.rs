//! Background polling loops for folder hierarchies and message lists
//!
//! Every loop owns a [`StopSignal`] and is driven by [`spawn_poller`]: run a
//! cycle, report a failure if there was one, sleep, repeat. Failures never
//! leave the loop. A stop request is honored at the next checkpoint, which
//! is the sleep between cycles or a per-item check inside a fetch.

pub mod actions;
pub mod hierarchy;
pub mod inbox;
pub mod reconcile;
pub mod session;
pub mod sync_manager;

pub use actions::{MessageActions, PendingRemote};
pub use hierarchy::{fetch_folder_tree, FolderHierarchyWatcher};
pub use inbox::InboxWatcher;
pub use reconcile::{FolderReconcileTask, MessageListReconciler, ReconcileOutcome};
pub use session::AccountSession;
pub use sync_manager::SyncManager;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AsgardError, AsgardResult};

/// Receiving side of a loop's stop request
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Create a linked sender/signal pair
    pub fn channel() -> (watch::Sender<bool>, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (tx, StopSignal { rx })
    }

    /// Check if a stop was requested or the owning handle is gone
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Fail with `Cancelled` once a stop was requested
    pub fn checkpoint(&self) -> AsgardResult<()> {
        if self.is_stopped() {
            Err(AsgardError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`; returns `false` if a stop arrived first
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return !self.is_stopped(),
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// Run a `StopSignal` checkpoint if one was supplied
pub(crate) fn checkpoint(stop: Option<&StopSignal>) -> AsgardResult<()> {
    stop.map_or(Ok(()), StopSignal::checkpoint)
}

/// One unit of recurring background work
#[async_trait::async_trait]
pub trait PollTask: Send + Sync + 'static {
    /// Name used in log lines
    fn name(&self) -> String;

    /// Run a single cycle
    async fn run_cycle(&self, stop: &StopSignal) -> AsgardResult<()>;

    /// Surface a failed cycle to the user; the loop keeps running
    fn report_failure(&self, error: &AsgardError);
}

/// When the first cycle of a poller runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstCycle {
    /// Run immediately
    Immediate,
    /// Wait one interval first
    AfterInterval,
}

/// Handle to a running poll loop
#[derive(Debug)]
pub struct PollHandle {
    name: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Loop name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the loop to stop at its next checkpoint
    pub fn stop(&self) {
        // Fails only when the loop already exited.
        let _ = self.stop_tx.send(true);
    }

    /// Check if the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Poll loop {} ended abnormally: {}", self.name, e);
        }
    }

    /// Stop the loop and wait for it
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

/// Spawn a background loop running `task` every `interval`
pub fn spawn_poller<T: PollTask>(task: Arc<T>, interval: Duration, first: FirstCycle) -> PollHandle {
    let name = task.name();
    let (stop_tx, mut stop) = StopSignal::channel();
    let loop_name = name.clone();

    let handle = tokio::spawn(async move {
        info!("Started {} (interval {:?})", loop_name, interval);

        if first == FirstCycle::AfterInterval && !stop.sleep(interval).await {
            info!("Stopped {}", loop_name);
            return;
        }

        loop {
            if stop.is_stopped() {
                break;
            }

            match task.run_cycle(&stop).await {
                Ok(()) => debug!("{} cycle completed", loop_name),
                Err(AsgardError::Cancelled) => break,
                Err(e) => task.report_failure(&e),
            }

            if !stop.sleep(interval).await {
                break;
            }
        }

        info!("Stopped {}", loop_name);
    });

    PollHandle {
        name,
        stop_tx,
        task: handle,
    }
}
