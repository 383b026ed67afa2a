//! Per-feed check with "timeout without a timeout exception" semantics.
//!
//! The detector runs as its own spawned task so a stuck fetch can be
//! cancelled rather than merely abandoned: on timeout the worker calls
//! `JoinHandle::abort()` and then awaits the handle anyway, using the
//! resulting `JoinError` to tell a clean cancellation apart from a task that
//! had already panicked. This is the same `tokio::select!` + `abort()` +
//! await-to-classify pattern used elsewhere in this codebase for task timeouts,
//! generalized here to log the four-way outcome split used by the stats module.

use std::time::Duration;

use tracing::{error, warn};

use crate::context::MonitorContext;
use crate::detector::UpdateDetector;
use crate::state::TaskState;

pub struct MonitorWorker {
    ctx: MonitorContext,
    feed_id: u64,
}

impl MonitorWorker {
    pub fn new(ctx: MonitorContext, feed_id: u64) -> Self {
        Self { ctx, feed_id }
    }

    pub async fn run(self) {
        let timeout = Duration::from_secs(self.ctx.config.tunables.monitor_timeout_secs);
        let ctx = self.ctx.clone();
        let feed_id = self.feed_id;

        let mut handle = tokio::spawn(async move {
            let detector = UpdateDetector::new(ctx);
            detector.check_feed(feed_id).await
        });

        tokio::select! {
            biased;
            joined = &mut handle => {
                Self::classify_without_timeout(joined, &self.ctx, feed_id);
            }
            _ = tokio::time::sleep(timeout) => {
                Self::classify_after_timeout(handle, &self.ctx, feed_id).await;
            }
        }

        self.ctx.state.erase(feed_id, TaskState::IN_PROGRESS);
    }

    fn classify_without_timeout(
        joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
        ctx: &MonitorContext,
        feed_id: u64,
    ) {
        match joined {
            Ok(Ok(())) => {
                // detector.check_feed already recorded its own outcome.
            }
            Ok(Err(err)) => {
                error!(feed_id, error = %err, "feed check returned an error");
                ctx.stats.lock().unwrap().unknown_error();
            }
            Err(join_err) if join_err.is_panic() => {
                error!(feed_id, "feed check panicked");
                ctx.stats.lock().unwrap().unknown_error();
            }
            Err(join_err) => {
                warn!(feed_id, reason = %join_err, "feed check cancelled unexpectedly");
                ctx.stats.lock().unwrap().cancelled();
            }
        }
    }

    async fn classify_after_timeout(
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
        ctx: &MonitorContext,
        feed_id: u64,
    ) {
        warn!(feed_id, "feed check timed out, aborting");
        handle.abort();
        match handle.await {
            Err(join_err) if join_err.is_cancelled() => {
                ctx.stats.lock().unwrap().timeout();
            }
            Err(join_err) if join_err.is_panic() => {
                error!(feed_id, "feed check panicked while being aborted for timeout");
                ctx.stats.lock().unwrap().timeout_unknown_error();
            }
            _ => {
                // Finished (or failed cleanly) in the race window right as
                // the abort landed; still counts against the timeout budget.
                ctx.stats.lock().unwrap().timeout();
            }
        }
    }
}
