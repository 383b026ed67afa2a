//! Single background task that turns queued feed ids into spawned workers.
//!
//! Mirrors `execute_single_task`-style dispatch loops: the dispatcher itself never
//! awaits a worker to completion, it only spawns one and moves on to the
//! next queued id, so one slow feed can never hold up the rest.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::MonitorContext;
use crate::worker::MonitorWorker;

/// Drains the submission queue and spawns one [`MonitorWorker`] per id.
pub struct Dispatcher {
    ctx: MonitorContext,
}

impl Dispatcher {
    pub fn new(ctx: MonitorContext) -> Self {
        Self { ctx }
    }

    /// Runs until `rx` is closed (i.e. every [`crate::queue::SubmissionQueue`]
    /// handle has been dropped), which happens during graceful shutdown.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<u64>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(feed_id) = rx.recv().await {
                debug!(feed_id, "dispatching");
                self.ctx.state.mark_in_progress(feed_id);
                let worker = MonitorWorker::new(self.ctx.clone(), feed_id);
                tokio::spawn(worker.run());
            }
            debug!("dispatcher exiting: submission queue closed");
        })
    }
}
