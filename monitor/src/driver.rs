//! Periodic tick that resolves due feed ids and submits them.
//!
//! Grounded in `run_periodic_task`: print the rolling summary first, ask the
//! external task source which feed ids are due, load those feeds, then
//! submit each one through the state table (which decides whether to
//! enqueue immediately or fold the request into a deferral).

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::context::MonitorContext;
use shared::traits::TaskSource;

pub struct PeriodicDriver {
    ctx: MonitorContext,
    task_source: std::sync::Arc<dyn TaskSource>,
    period: Duration,
}

impl PeriodicDriver {
    pub fn new(ctx: MonitorContext, task_source: std::sync::Arc<dyn TaskSource>, period: Duration) -> Self {
        Self { ctx, task_source, period }
    }

    /// Runs one driver tick. Exposed separately from [`Self::run`] so tests
    /// can step the driver without depending on wall-clock timing.
    pub async fn tick(&self) -> anyhow::Result<()> {
        self.ctx.stats.lock().unwrap().print_summary();

        let due_ids = self.task_source.get_tasks().await?;
        if due_ids.is_empty() {
            return Ok(());
        }

        let feeds = self.ctx.store.filter_ids(&due_ids).await?;
        debug!(count = feeds.len(), "started a periodic monitoring tick");

        for feed in feeds {
            match self.ctx.state.submit(feed.id) {
                crate::state::SubmitOutcome::Enqueued | crate::state::SubmitOutcome::AnomalyResubmit => {
                    self.ctx.queue.push(feed.id);
                }
                crate::state::SubmitOutcome::DeferredNow => {}
            }
        }

        Ok(())
    }

    /// Ticks forever on `period`, until cancelled.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = self.tick().await {
                tracing::error!(error = %err, "periodic driver tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SubmissionQueue;
    use crate::state::FeedStateTable;
    use crate::stats::StatsAggregator;
    use async_trait::async_trait;
    use shared::config::MonitorConfig;
    use shared::model::{Feed, FeedField, Sub};
    use shared::traits::{Clock, FeedStore, FeedUtilities, Fetcher, FloodLocks, MessageCatalog, Parser, SendError, SystemClock, Transport};
    use shared::web::WebFeed;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct FakeStore(Mutex<HashMap<u64, Feed>>);

    #[async_trait]
    impl FeedStore for FakeStore {
        async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Feed>> {
            Ok(self.0.lock().unwrap().get(&id).cloned())
        }
        async fn filter_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Feed>> {
            let feeds = self.0.lock().unwrap();
            Ok(ids.iter().filter_map(|id| feeds.get(id).cloned()).collect())
        }
        async fn save(&self, feed: &Feed, _fields: &[FeedField]) -> anyhow::Result<()> {
            self.0.lock().unwrap().insert(feed.id, feed.clone());
            Ok(())
        }
        async fn active_subs(&self, _feed_id: u64) -> anyhow::Result<Vec<Sub>> {
            Ok(vec![])
        }
        async fn user_lang(&self, _user_id: u64) -> anyhow::Result<String> {
            Ok("en".to_string())
        }
    }

    struct StaticTasks(Vec<u64>);

    #[async_trait]
    impl TaskSource for StaticTasks {
        async fn get_tasks(&self) -> anyhow::Result<Vec<u64>> {
            Ok(self.0.clone())
        }
    }

    struct NoopFetcher;
    #[async_trait]
    impl Fetcher for NoopFetcher {
        async fn feed_get(&self, link: &str, _headers: HashMap<String, String>) -> WebFeed {
            WebFeed::not_modified(link)
        }
    }

    struct NoopParser;
    impl Parser for NoopParser {
        fn get_post_from_entry(&self, _entry: &shared::model::Entry, _feed_title: &str, _feed_link: &str) -> anyhow::Result<shared::model::Post> {
            unreachable!("not exercised in driver tests")
        }
    }

    struct NoopTransport;
    #[async_trait]
    impl Transport for NoopTransport {
        async fn resolve_user(&self, _user_id: u64) -> Result<(), SendError> {
            Ok(())
        }
        async fn send_post(&self, _user_id: u64, _post: &shared::model::Post, _notify: bool) -> Result<(), SendError> {
            Ok(())
        }
        async fn send_operator_message(&self, _text: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    struct NeverLocked;
    #[async_trait]
    impl FloodLocks for NeverLocked {
        async fn is_locked(&self, _user_id: u64) -> bool {
            false
        }
    }

    struct NoopUtilities;
    #[async_trait]
    impl FeedUtilities for NoopUtilities {
        async fn update_interval(&self, _feed: &Feed) -> anyhow::Result<()> {
            Ok(())
        }
        async fn migrate_to_new_url(&self, _feed: &Feed, _new_url: &str) -> anyhow::Result<Option<Feed>> {
            Ok(None)
        }
        async fn deactivate_feed(&self, _feed: &Feed) -> anyhow::Result<()> {
            Ok(())
        }
        async fn unsub_all_and_leave_chat(&self, _user_id: u64) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct EnglishOnly;
    impl MessageCatalog for EnglishOnly {
        fn feed_deactivated_warning(&self, _lang: &str) -> String {
            String::new()
        }
    }

    fn feed(id: u64) -> Feed {
        Feed {
            id,
            link: format!("https://example.com/{id}"),
            title: "t".to_string(),
            etag: None,
            last_modified: None,
            updated_at: chrono::Utc::now(),
            entry_hashes: None,
            error_count: 0,
            next_check_time: None,
            interval: None,
        }
    }

    #[tokio::test]
    async fn due_feeds_are_enqueued() {
        let store = Arc::new(FakeStore(Mutex::new(HashMap::from([(1, feed(1)), (2, feed(2))]))));
        let stats = Arc::new(Mutex::new(StatsAggregator::new()));
        let (queue, mut rx) = SubmissionQueue::channel();
        let state = FeedStateTable::new(stats.clone(), queue.sender(), 5);

        let ctx = MonitorContext {
            config: Arc::new(MonitorConfig::default()),
            store: store.clone(),
            fetcher: Arc::new(NoopFetcher),
            parser: Arc::new(NoopParser),
            transport: Arc::new(NoopTransport),
            flood_locks: Arc::new(NeverLocked),
            utilities: Arc::new(NoopUtilities),
            messages: Arc::new(EnglishOnly),
            clock: Arc::new(SystemClock),
            state,
            queue,
            stats,
            user_unsub_locks: Arc::new(Mutex::new(HashMap::new())),
            blocked_counts: Arc::new(Mutex::new(HashMap::new())),
        };

        let driver = PeriodicDriver::new(ctx, Arc::new(StaticTasks(vec![1, 2])), Duration::from_secs(1));
        driver.tick().await.unwrap();

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_task_source_enqueues_nothing() {
        let store = Arc::new(FakeStore(Mutex::new(HashMap::new())));
        let stats = Arc::new(Mutex::new(StatsAggregator::new()));
        let (queue, mut rx) = SubmissionQueue::channel();
        let state = FeedStateTable::new(stats.clone(), queue.sender(), 5);

        let ctx = MonitorContext {
            config: Arc::new(MonitorConfig::default()),
            store,
            fetcher: Arc::new(NoopFetcher),
            parser: Arc::new(NoopParser),
            transport: Arc::new(NoopTransport),
            flood_locks: Arc::new(NeverLocked),
            utilities: Arc::new(NoopUtilities),
            messages: Arc::new(EnglishOnly),
            clock: Arc::new(SystemClock),
            state,
            queue,
            stats,
            user_unsub_locks: Arc::new(Mutex::new(HashMap::new())),
            blocked_counts: Arc::new(Mutex::new(HashMap::new())),
        };

        let driver = PeriodicDriver::new(ctx, Arc::new(StaticTasks(vec![])), Duration::from_secs(1));
        driver.tick().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
