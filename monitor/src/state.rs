//! Per-feed submission/deferral state machine.
//!
//! The original keeps a `defaultdict[int, TaskState]` of `IntFlag` bitsets
//! and relies on cooperative scheduling to make each read-modify-write
//! sequence atomic. Running atop tokio's multi-thread runtime instead
//! requires an explicit lock:
//! every operation below takes `self.table` for the duration of its
//! synchronous critical section and never holds it across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stats::StatsAggregator;

/// Hand-rolled in place of the `bitflags` crate: nothing else in this
/// codebase reaches for it, and three bits don't warrant a new dependency.
macro_rules! bitflags_lite {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($repr);

        impl $name {
            pub const EMPTY: Self = Self(0);
            $(pub const $flag: Self = Self($value);)*

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

bitflags_lite! {
    /// A bitset over {LOCKED, IN_PROGRESS, DEFERRED}. The empty set means "no
    /// activity; the table entry may be evicted".
    pub struct TaskState: u8 {
        const LOCKED = 1 << 0;
        const IN_PROGRESS = 1 << 1;
        const DEFERRED = 1 << 2;
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "EMPTY");
        }
        let mut parts = Vec::new();
        if self.contains(TaskState::LOCKED) {
            parts.push("LOCKED");
        }
        if self.contains(TaskState::IN_PROGRESS) {
            parts.push("IN_PROGRESS");
        }
        if self.contains(TaskState::DEFERRED) {
            parts.push("DEFERRED");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Outcome of [`FeedStateTable::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The feed was locked and should now be pushed onto the submission queue.
    Enqueued,
    /// Another check is already outstanding; this submission was folded into
    /// the DEFERRED bit instead.
    DeferredNow,
    /// Anomaly: a lone DEFERRED flag was found with nothing to defer
    /// from (Open Question (b)); falls through and enqueues anyway.
    AnomalyResubmit,
}

struct Inner {
    table: Mutex<HashMap<u64, TaskState>>,
    stats: Arc<Mutex<StatsAggregator>>,
    ready_tx: mpsc::UnboundedSender<u64>,
    minimal_interval_minutes: u32,
}

/// Cheaply cloneable handle to the shared per-feed state table.
///
/// Cloning shares the same underlying map/stats/queue (all held behind
/// `Arc`), so a clone can be moved into a spawned `tokio::time::sleep` task
/// to perform the deferred LOCK auto-clear (see `lock`).
#[derive(Clone)]
pub struct FeedStateTable {
    inner: Arc<Inner>,
}

impl FeedStateTable {
    pub fn new(
        stats: Arc<Mutex<StatsAggregator>>,
        ready_tx: mpsc::UnboundedSender<u64>,
        minimal_interval_minutes: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(HashMap::new()),
                stats,
                ready_tx,
                minimal_interval_minutes,
            }),
        }
    }

    /// Caller (the `PeriodicDriver`) is responsible for
    /// pushing `feed_id` onto the `SubmissionQueue` when this returns
    /// [`SubmitOutcome::Enqueued`] or [`SubmitOutcome::AnomalyResubmit`].
    pub fn submit(&self, feed_id: u64) -> SubmitOutcome {
        let current = {
            let table = self.inner.table.lock().unwrap();
            table.get(&feed_id).copied().unwrap_or(TaskState::EMPTY)
        };

        if current == TaskState::DEFERRED {
            warn!(feed_id, "deferred task was never resubmitted");
            // fall through: lock and enqueue anyway.
            self.lock(feed_id);
            return SubmitOutcome::AnomalyResubmit;
        }

        if !current.is_empty() {
            let mut table = self.inner.table.lock().unwrap();
            let entry = table.entry(feed_id).or_insert(TaskState::EMPTY);
            entry.insert(TaskState::DEFERRED);
            drop(table);
            self.inner.stats.lock().unwrap().deferred();
            debug!(feed_id, state = %current, "deferred");
            return SubmitOutcome::DeferredNow;
        }

        self.lock(feed_id);
        SubmitOutcome::Enqueued
    }

    /// Only takes effect when `minimal_interval > 1` minute;
    /// otherwise locking would be meaningless since the scheduler's own
    /// cadence is already coarser than one minute.
    fn lock(&self, feed_id: u64) {
        if self.inner.minimal_interval_minutes <= 1 {
            return;
        }
        {
            let mut table = self.inner.table.lock().unwrap();
            table.insert(feed_id, TaskState::LOCKED);
        }

        let this = self.clone();
        let delay = std::time::Duration::from_secs(self.inner.minimal_interval_minutes as u64 * 60);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.erase(feed_id, TaskState::LOCKED);
        });
    }

    /// Sets IN_PROGRESS before spawning the detector.
    pub fn mark_in_progress(&self, feed_id: u64) {
        let mut table = self.inner.table.lock().unwrap();
        table.entry(feed_id).or_insert(TaskState::EMPTY).insert(TaskState::IN_PROGRESS);
    }

    /// Clears `bit`; if the only bit remaining is DEFERRED, the
    /// feed is due for resubmission: re-lock it and push it back
    /// onto the queue, otherwise write back whatever (possibly empty) state
    /// remains.
    pub fn erase(&self, feed_id: u64, bit: TaskState) {
        let erased = {
            let mut table = self.inner.table.lock().unwrap();
            let Some(current) = table.get(&feed_id).copied() else {
                warn!(feed_id, "erase on unexpected empty state");
                return;
            };
            if current.is_empty() {
                warn!(feed_id, "erase on unexpected empty state");
                return;
            }
            let erased = current.remove(bit);
            if erased == TaskState::DEFERRED {
                table.remove(&feed_id);
            } else if erased.is_empty() {
                table.remove(&feed_id);
            } else {
                table.insert(feed_id, erased);
            }
            erased
        };

        if erased == TaskState::DEFERRED {
            self.lock(feed_id);
            let _ = self.inner.ready_tx.send(feed_id);
            self.inner.stats.lock().unwrap().resubmitted();
            debug!(feed_id, "resubmitted a deferred task");
        }
    }

    /// Current flags for a feed, exposed for tests and diagnostics.
    pub fn state_of(&self, feed_id: u64) -> TaskState {
        self.inner
            .table
            .lock()
            .unwrap()
            .get(&feed_id)
            .copied()
            .unwrap_or(TaskState::EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_queue(minimal_interval: u32) -> (FeedStateTable, mpsc::UnboundedReceiver<u64>, Arc<Mutex<StatsAggregator>>) {
        let stats = Arc::new(Mutex::new(StatsAggregator::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        (FeedStateTable::new(stats.clone(), tx, minimal_interval), rx, stats)
    }

    #[tokio::test]
    async fn submit_on_empty_state_locks_when_minimal_interval_applies() {
        let (table, _rx, _stats) = table_with_queue(5);
        assert_eq!(table.submit(1), SubmitOutcome::Enqueued);
        assert_eq!(table.state_of(1), TaskState::LOCKED);
    }

    #[test]
    fn submit_on_empty_state_does_not_lock_when_minimal_interval_is_one() {
        let (table, _rx, _stats) = table_with_queue(1);
        assert_eq!(table.submit(1), SubmitOutcome::Enqueued);
        assert_eq!(table.state_of(1), TaskState::EMPTY);
    }

    #[tokio::test]
    async fn submit_while_locked_defers_and_does_not_enqueue() {
        let (table, mut rx, stats) = table_with_queue(5);
        table.submit(1);
        assert_eq!(table.submit(1), SubmitOutcome::DeferredNow);
        assert_eq!(table.state_of(1), TaskState::LOCKED | TaskState::DEFERRED);
        assert_eq!(stats.lock().unwrap().tier2_snapshot().deferred, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn erase_resubmits_when_only_deferred_remains() {
        let (table, mut rx, stats) = table_with_queue(5);
        table.mark_in_progress(1);
        // feed goes: EMPTY -> IN_PROGRESS -> (submit while in progress) -> IN_PROGRESS|DEFERRED
        assert_eq!(table.submit(1), SubmitOutcome::DeferredNow);
        table.erase(1, TaskState::IN_PROGRESS);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(stats.lock().unwrap().tier2_snapshot().resubmitted, 1);
        assert_eq!(table.state_of(1), TaskState::LOCKED);
    }

    #[test]
    fn erase_on_empty_state_is_a_harmless_anomaly() {
        let (table, mut rx, _stats) = table_with_queue(5);
        table.erase(42, TaskState::IN_PROGRESS);
        assert!(rx.try_recv().is_err());
        assert_eq!(table.state_of(42), TaskState::EMPTY);
    }

    #[tokio::test]
    async fn submit_anomaly_when_lone_deferred_found() {
        let (table, _rx, _stats) = table_with_queue(5);
        {
            let mut t = table.inner.table.lock().unwrap();
            t.insert(7, TaskState::DEFERRED);
        }
        assert_eq!(table.submit(7), SubmitOutcome::AnomalyResubmit);
    }
}
