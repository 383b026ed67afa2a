//! Per-entry rendering and per-subscriber delivery.
//!
//! Grounded in the original's `__notify_all`/`__send`/
//! `__locked_unsub_all_and_leave_chat`: entries are delivered oldest-new
//! first, each subscriber send races a timeout, and a subscriber who keeps
//! coming back as blocked/gone is unsubscribed from everything after
//! `blocked_tolerance` consecutive failures, serialized per user so a burst
//! of concurrent sends to the same blocked user doesn't unsubscribe them
//! more than once.

use std::sync::Arc;
use std::time::Duration;

use shared::model::{Entry, Feed, Sub};
use shared::traits::SendError;
use tokio::sync::Mutex as AsyncMutex;
use tracing::error;

use crate::context::MonitorContext;

pub struct DeliveryFanout {
    ctx: MonitorContext,
}

impl DeliveryFanout {
    pub fn new(ctx: MonitorContext) -> Self {
        Self { ctx }
    }

    /// Renders and delivers each of `entries` (newest-first) to every sub,
    /// oldest-first, so recipients read updates in chronological order.
    pub async fn notify_all(&self, feed: &Feed, subs: &[Sub], entries: &[&Entry]) {
        for entry in entries.iter().rev() {
            let post = match self.ctx.parser.get_post_from_entry(entry, &feed.title, &feed.link) {
                Ok(post) => post,
                Err(err) => {
                    error!(feed_id = feed.id, link = entry.link.as_deref().unwrap_or(""), error = %err, "failed to parse post from entry");
                    let text = format!(
                        "Something went wrong while parsing a post from feed {} ({}): {err}",
                        feed.title, feed.link
                    );
                    let _ = self.ctx.transport.send_operator_message(&text).await;
                    continue;
                }
            };

            let send_timeout = Duration::from_secs(self.ctx.config.tunables.send_timeout_secs);
            let sends = subs.iter().map(|sub| {
                let post = post.clone();
                async move {
                    let result = tokio::time::timeout(send_timeout, self.send_to_sub(sub, &post)).await;
                    match result {
                        Ok(_) => {}
                        Err(_) => {
                            error!(
                                user_id = sub.user_id,
                                link = post.link.as_deref().unwrap_or(""),
                                "failed to send post due to timeout"
                            );
                        }
                    }
                }
            });
            futures_util::future::join_all(sends).await;
        }
    }

    async fn send_to_sub(&self, sub: &Sub, post: &shared::model::Post) {
        if let Err(err) = self.ctx.transport.resolve_user(sub.user_id).await {
            match err {
                SendError::EntityNotFound => {
                    self.locked_unsub_all_and_leave_chat(sub.user_id, "EntityNotFoundError").await;
                }
                other => {
                    error!(user_id = sub.user_id, error = %other, "failed to resolve user before send");
                }
            }
            return;
        }

        match self.ctx.transport.send_post(sub.user_id, post, sub.notify).await {
            Ok(()) => {
                self.ctx.blocked_counts.lock().unwrap().remove(&sub.user_id);
            }
            Err(SendError::UserBlocked) => {
                self.locked_unsub_all_and_leave_chat(sub.user_id, "UserBlockedError").await;
            }
            Err(SendError::BadRequest(msg)) if msg == "TOPIC_CLOSED" => {
                self.locked_unsub_all_and_leave_chat(sub.user_id, "TOPIC_CLOSED").await;
            }
            Err(other) => {
                error!(user_id = sub.user_id, error = %other, "failed to send post");
            }
        }
    }

    /// Blocked-user handling: unsubscribes after `blocked_tolerance`
    /// consecutive failures, serialized per user via an async mutex so a
    /// burst of concurrent sends only triggers the unsubscribe once.
    async fn locked_unsub_all_and_leave_chat(&self, user_id: u64, reason: &str) {
        let user_lock = {
            let mut locks = self.ctx.user_unsub_locks.lock().unwrap();
            locks.entry(user_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };

        let Ok(_guard) = user_lock.try_lock() else {
            return; // an unsubscribe is already in flight for this user
        };

        let tolerance = self.ctx.config.tunables.blocked_tolerance;
        let should_unsub = {
            let mut counts = self.ctx.blocked_counts.lock().unwrap();
            let count = counts.entry(user_id).or_insert(0);
            *count += 1;
            if *count < tolerance {
                false
            } else {
                counts.remove(&user_id);
                true
            }
        };
        if !should_unsub {
            return;
        }

        error!(user_id, reason, "user blocked, unsubscribing from everything");
        if let Err(err) = self.ctx.utilities.unsub_all_and_leave_chat(user_id).await {
            error!(user_id, error = %err, "failed to unsubscribe blocked user");
        }
    }

    /// Failure path: notifies every active subscriber that a feed was
    /// deactivated after sustained fetch failure.
    pub async fn deactivate_and_notify_all(&self, feed: &Feed, subs: &[Sub], reason: &str) {
        if let Err(err) = self.ctx.utilities.deactivate_feed(feed).await {
            error!(feed_id = feed.id, error = %err, "failed to mark feed inactive");
        }
        if subs.is_empty() {
            return;
        }

        let notifications = subs.iter().map(|sub| async move {
            let lang = self.ctx.store.user_lang(sub.user_id).await.unwrap_or_else(|_| "en".to_string());
            let title = sub.title.clone().unwrap_or_else(|| feed.title.clone());
            let mut body = format!(
                "<a href=\"{}\">{}</a>\n{}",
                feed.link,
                title,
                self.ctx.messages.feed_deactivated_warning(&lang)
            );
            if !reason.is_empty() {
                body.push('\n');
                body.push_str(reason);
            }
            let post = shared::model::Post::new(body, feed.title.clone(), feed.link.clone());
            self.send_to_sub(sub, &post).await;
        });
        futures_util::future::join_all(notifications).await;
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
    use shared::traits::{FeedStore, FeedUtilities, Fetcher, FloodLocks, MessageCatalog, Parser, SystemClock, Transport};
    use shared::web::WebFeed;
    use std::sync::{Arc, Mutex as StdMutex};

    struct RecordingStore;
    #[async_trait]
    impl FeedStore for RecordingStore {
        async fn get_by_id(&self, _id: u64) -> anyhow::Result<Option<Feed>> {
            Ok(None)
        }
        async fn filter_ids(&self, _ids: &[u64]) -> anyhow::Result<Vec<Feed>> {
            Ok(vec![])
        }
        async fn save(&self, _feed: &Feed, _fields: &[shared::model::FeedField]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn active_subs(&self, _feed_id: u64) -> anyhow::Result<Vec<Sub>> {
            Ok(vec![])
        }
        async fn user_lang(&self, _user_id: u64) -> anyhow::Result<String> {
            Ok("en".to_string())
        }
    }

    struct NoopFetcher;
    #[async_trait]
    impl Fetcher for NoopFetcher {
        async fn feed_get(&self, link: &str, _headers: std::collections::HashMap<String, String>) -> WebFeed {
            WebFeed::not_modified(link)
        }
    }

    struct EchoParser;
    impl Parser for EchoParser {
        fn get_post_from_entry(&self, entry: &Entry, feed_title: &str, feed_link: &str) -> anyhow::Result<shared::model::Post> {
            let mut post = shared::model::Post::new(entry.summary.clone().unwrap_or_default(), feed_title, feed_link);
            post.link = entry.link.clone();
            Ok(post)
        }
    }

    /// Records every delivered post's link, in delivery order, and lets a
    /// test script a per-user outcome for `send_post`.
    #[derive(Default)]
    struct ScriptedTransport {
        delivered: StdMutex<Vec<Option<String>>>,
        outcomes: StdMutex<std::collections::HashMap<u64, SendError>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn resolve_user(&self, _user_id: u64) -> Result<(), SendError> {
            Ok(())
        }
        async fn send_post(&self, user_id: u64, post: &shared::model::Post, _notify: bool) -> Result<(), SendError> {
            if let Some(err) = self.outcomes.lock().unwrap().get(&user_id) {
                return Err(err.clone());
            }
            self.delivered.lock().unwrap().push(post.link.clone());
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

    #[derive(Default)]
    struct RecordingUtilities {
        unsubscribed: StdMutex<Vec<u64>>,
    }

    #[async_trait]
    impl FeedUtilities for RecordingUtilities {
        async fn update_interval(&self, _feed: &Feed) -> anyhow::Result<()> {
            Ok(())
        }
        async fn migrate_to_new_url(&self, _feed: &Feed, _new_url: &str) -> anyhow::Result<Option<Feed>> {
            Ok(None)
        }
        async fn deactivate_feed(&self, _feed: &Feed) -> anyhow::Result<()> {
            Ok(())
        }
        async fn unsub_all_and_leave_chat(&self, user_id: u64) -> anyhow::Result<()> {
            self.unsubscribed.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    struct EnglishOnly;
    impl MessageCatalog for EnglishOnly {
        fn feed_deactivated_warning(&self, _lang: &str) -> String {
            "deactivated".to_string()
        }
    }

    fn feed() -> Feed {
        Feed {
            id: 1,
            link: "https://example.com/feed".to_string(),
            title: "Feed".to_string(),
            etag: None,
            last_modified: None,
            updated_at: chrono::Utc::now(),
            entry_hashes: None,
            error_count: 0,
            next_check_time: None,
            interval: None,
        }
    }

    fn sub(user_id: u64) -> Sub {
        Sub {
            user_id,
            feed_id: 1,
            state: shared::model::SubState::Active,
            title: None,
            notify: true,
        }
    }

    fn entry(link: &str) -> Entry {
        Entry {
            link: Some(link.to_string()),
            title: None,
            summary: Some("body".to_string()),
            author: None,
        }
    }

    fn ctx_with(transport: Arc<ScriptedTransport>, utilities: Arc<RecordingUtilities>) -> MonitorContext {
        let stats = Arc::new(std::sync::Mutex::new(StatsAggregator::new()));
        let (queue, _rx) = SubmissionQueue::channel();
        let state = FeedStateTable::new(stats.clone(), queue.sender(), 5);
        MonitorContext {
            config: Arc::new(MonitorConfig::default()),
            store: Arc::new(RecordingStore),
            fetcher: Arc::new(NoopFetcher),
            parser: Arc::new(EchoParser),
            transport,
            flood_locks: Arc::new(NeverLocked),
            utilities,
            messages: Arc::new(EnglishOnly),
            clock: Arc::new(SystemClock),
            state,
            queue,
            stats,
            user_unsub_locks: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
            blocked_counts: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        }
    }

    #[tokio::test]
    async fn entries_are_delivered_oldest_first() {
        let transport = Arc::new(ScriptedTransport::default());
        let utilities = Arc::new(RecordingUtilities::default());
        let ctx = ctx_with(transport.clone(), utilities);
        let fanout = DeliveryFanout::new(ctx);

        // Newest-first input, as the detector hands it over.
        let newest_first = vec![entry("newest"), entry("middle"), entry("oldest")];
        let refs: Vec<&Entry> = newest_first.iter().collect();
        fanout.notify_all(&feed(), &[sub(1)], &refs).await;

        let delivered = transport.delivered.lock().unwrap().clone();
        assert_eq!(
            delivered,
            vec![Some("oldest".to_string()), Some("middle".to_string()), Some("newest".to_string())]
        );
    }

    #[tokio::test]
    async fn blocked_user_is_unsubscribed_only_after_reaching_tolerance() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.outcomes.lock().unwrap().insert(1, SendError::UserBlocked);
        let utilities = Arc::new(RecordingUtilities::default());
        let ctx = ctx_with(transport, utilities.clone());

        // blocked_tolerance defaults to 5; four failed sends must not unsubscribe.
        // Each call builds a fresh `DeliveryFanout`, the way `check_feed` does
        // on every pass, to prove the counter lives on the shared context
        // rather than resetting with the wrapper.
        for _ in 0..4 {
            DeliveryFanout::new(ctx.clone()).notify_all(&feed(), &[sub(1)], &[&entry("x")]).await;
        }
        assert!(utilities.unsubscribed.lock().unwrap().is_empty());

        DeliveryFanout::new(ctx.clone()).notify_all(&feed(), &[sub(1)], &[&entry("x")]).await;
        assert_eq!(*utilities.unsubscribed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn deactivate_and_notify_all_marks_feed_inactive_and_messages_every_sub() {
        let transport = Arc::new(ScriptedTransport::default());
        let utilities = Arc::new(RecordingUtilities::default());
        let ctx = ctx_with(transport.clone(), utilities);
        let fanout = DeliveryFanout::new(ctx);

        fanout.deactivate_and_notify_all(&feed(), &[sub(1), sub(2)], "too many failures").await;

        // Both subs received a (link-less) deactivation notice.
        let delivered = transport.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|link| link.is_none()));
    }
}
