//! Shared handles wired once at startup and cloned into every task.
//!
//! Mirrors how a `SchedulerState` bundles its shared
//! dependencies behind `Arc` so each spawned worker gets a cheap clone
//! instead of a lifetime-bound reference.

use std::collections::HashMap;
use std::sync::Arc;

use shared::config::MonitorConfig;
use shared::traits::{Clock, FeedStore, FeedUtilities, Fetcher, FloodLocks, MessageCatalog, Parser, Transport};

use crate::queue::SubmissionQueue;
use crate::state::FeedStateTable;
use crate::stats::StatsAggregator;

/// Everything a [`crate::detector::UpdateDetector`] or
/// [`crate::fanout::DeliveryFanout`] needs, bundled so call sites don't grow
/// a dozen constructor parameters every time a new collaborator is added.
#[derive(Clone)]
pub struct MonitorContext {
    pub config: Arc<MonitorConfig>,
    pub store: Arc<dyn FeedStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn Parser>,
    pub transport: Arc<dyn Transport>,
    pub flood_locks: Arc<dyn FloodLocks>,
    pub utilities: Arc<dyn FeedUtilities>,
    pub messages: Arc<dyn MessageCatalog>,
    pub clock: Arc<dyn Clock>,
    pub state: FeedStateTable,
    pub queue: SubmissionQueue,
    pub stats: Arc<std::sync::Mutex<StatsAggregator>>,
    /// Process-wide per-user unsub-all coalescing lock, shared across every
    /// [`crate::fanout::DeliveryFanout`] built over the lifetime of the
    /// process so a burst of concurrent sends to the same blocked user only
    /// triggers one unsubscribe.
    pub user_unsub_locks: Arc<std::sync::Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>>,
    /// Process-wide per-user consecutive-blocked-failure counter, shared the
    /// same way so the tolerance threshold accumulates across separate
    /// feed-check passes instead of resetting every time.
    pub blocked_counts: Arc<std::sync::Mutex<HashMap<u64, u32>>>,
}
