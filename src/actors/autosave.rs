//! AutosaveActor - Periodically flushes the active backend
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → backend.save() → log failure and keep going
//!     ↑
//!     └─── Shutdown signal (supervisor re-initialization or process shutdown)
//! ```
//!
//! The first save happens one interval after the actor starts. A save
//! that is in progress when the shutdown signal arrives completes first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, trace, warn};

use crate::storage::{Backend, StorageBackend};

/// Actor that saves one backend generation at a fixed interval
pub(crate) struct AutosaveActor {
    backend: Arc<Backend>,
    interval: Duration,
    shutdown_rx: oneshot::Receiver<()>,

    /// Completed save attempts, successful or not
    ticks: Arc<AtomicU64>,
}

impl AutosaveActor {
    fn new(
        backend: Arc<Backend>,
        interval: Duration,
        shutdown_rx: oneshot::Receiver<()>,
        ticks: Arc<AtomicU64>,
    ) -> Self {
        Self {
            backend,
            interval,
            shutdown_rx,
            ticks,
        }
    }

    /// Run the actor's main loop until the shutdown signal arrives
    #[instrument(skip(self), fields(interval = ?self.interval))]
    pub async fn run(mut self) {
        debug!("starting autosave actor");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Either an explicit signal or the handle was dropped
                _ = &mut self.shutdown_rx => {
                    debug!("stopping autosave actor");
                    break;
                }

                _ = ticker.tick() => {
                    trace!("saving");
                    if let Err(e) = self.backend.save().await {
                        error!("autosave failed: {}", e);
                    }
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Handle owning a running [`AutosaveActor`]
#[derive(Debug)]
pub struct AutosaveHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
}

impl AutosaveHandle {
    /// Spawn an autosave actor for `backend`
    pub fn spawn(backend: Arc<Backend>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let ticks = Arc::new(AtomicU64::new(0));

        let actor = AutosaveActor::new(backend, interval, shutdown_rx, ticks.clone());
        let join = tokio::spawn(actor.run());

        Self {
            shutdown_tx,
            join,
            ticks,
        }
    }

    /// Number of save attempts made so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the actor and wait until it has stopped
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join.await {
            warn!("autosave actor ended abnormally: {}", e);
        }
    }
}
