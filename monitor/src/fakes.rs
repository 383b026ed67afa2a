//! In-memory reference adapters.
//!
//! The monitor core never implements persistence, fetching, parsing, or
//! delivery itself; these are minimal, in-process stand-ins good
//! enough to run the binary end-to-end and exercise every component without
//! a real database, HTTP client, or bot API. A production deployment swaps
//! every one of these out for a real adapter behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use shared::model::{Entry, Feed, FeedField, Post, Sub};
use shared::traits::{FeedStore, FeedUtilities, Fetcher, FloodLocks, MessageCatalog, Parser, SendError, TaskSource, Transport};
use shared::web::WebFeed;

/// Guards feed/sub state behind a single mutex; fine for a demo-scale
/// in-memory store, not meant to survive a restart.
#[derive(Default)]
pub struct InMemoryFeedStore {
    feeds: Mutex<HashMap<u64, Feed>>,
    subs: Mutex<HashMap<u64, Vec<Sub>>>,
}

impl InMemoryFeedStore {
    pub fn seed(&self, feed: Feed, subs: Vec<Sub>) {
        let id = feed.id;
        self.feeds.lock().unwrap().insert(id, feed);
        self.subs.lock().unwrap().insert(id, subs);
    }

    pub fn all_ids(&self) -> Vec<u64> {
        self.feeds.lock().unwrap().keys().copied().collect()
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Feed>> {
        Ok(self.feeds.lock().unwrap().get(&id).cloned())
    }

    async fn filter_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Feed>> {
        let feeds = self.feeds.lock().unwrap();
        Ok(ids.iter().filter_map(|id| feeds.get(id).cloned()).collect())
    }

    async fn save(&self, feed: &Feed, fields: &[FeedField]) -> anyhow::Result<()> {
        info!(feed_id = feed.id, fields = ?fields, "saving feed");
        self.feeds.lock().unwrap().insert(feed.id, feed.clone());
        Ok(())
    }

    async fn active_subs(&self, feed_id: u64) -> anyhow::Result<Vec<Sub>> {
        Ok(self
            .subs
            .lock()
            .unwrap()
            .get(&feed_id)
            .map(|subs| subs.iter().filter(|s| s.state == shared::model::SubState::Active).cloned().collect())
            .unwrap_or_default())
    }

    async fn user_lang(&self, _user_id: u64) -> anyhow::Result<String> {
        Ok("en".to_string())
    }
}

/// Always reports every known feed as due; a real adapter would track
/// per-feed schedules (`next_check_time`, interval) and only return the
/// subset that's actually elapsed.
pub struct AllFeedsDue(pub std::sync::Arc<InMemoryFeedStore>);

#[async_trait]
impl TaskSource for AllFeedsDue {
    async fn get_tasks(&self) -> anyhow::Result<Vec<u64>> {
        Ok(self.0.all_ids())
    }
}

/// Never actually fetches anything: always reports an empty, unchanged feed.
/// Stands in for a real HTTP client plus feed parser.
pub struct NullFetcher;

#[async_trait]
impl Fetcher for NullFetcher {
    async fn feed_get(&self, link: &str, _headers: HashMap<String, String>) -> WebFeed {
        WebFeed::not_modified(link)
    }
}

/// Turns an [`Entry`] into a [`Post`] by copying its fields verbatim.
pub struct PassthroughParser;

impl Parser for PassthroughParser {
    fn get_post_from_entry(&self, entry: &Entry, feed_title: &str, feed_link: &str) -> anyhow::Result<Post> {
        let mut post = Post::new(entry.summary.clone().unwrap_or_default(), feed_title, feed_link);
        post.title = entry.title.clone();
        post.link = entry.link.clone();
        post.author = entry.author.clone();
        Ok(post)
    }
}

/// Logs deliveries instead of calling a real bot API.
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn resolve_user(&self, _user_id: u64) -> Result<(), SendError> {
        Ok(())
    }

    async fn send_post(&self, user_id: u64, post: &Post, notify: bool) -> Result<(), SendError> {
        info!(user_id, title = ?post.title, notify, "delivering post");
        Ok(())
    }

    async fn send_operator_message(&self, text: &str) -> Result<(), SendError> {
        info!(text, "operator message");
        Ok(())
    }
}

/// Nobody is ever flood-waited.
pub struct NeverFloodLocked;

#[async_trait]
impl FloodLocks for NeverFloodLocked {
    async fn is_locked(&self, _user_id: u64) -> bool {
        false
    }
}

/// Logs lifecycle hooks instead of mutating real scheduling/subscription state.
pub struct LoggingUtilities;

#[async_trait]
impl FeedUtilities for LoggingUtilities {
    async fn update_interval(&self, feed: &Feed) -> anyhow::Result<()> {
        info!(feed_id = feed.id, "no active subscribers, extending interval");
        Ok(())
    }

    async fn migrate_to_new_url(&self, feed: &Feed, new_url: &str) -> anyhow::Result<Option<Feed>> {
        info!(feed_id = feed.id, old = %feed.link, new = new_url, "feed URL changed");
        Ok(None)
    }

    async fn deactivate_feed(&self, feed: &Feed) -> anyhow::Result<()> {
        info!(feed_id = feed.id, "deactivating feed");
        Ok(())
    }

    async fn unsub_all_and_leave_chat(&self, user_id: u64) -> anyhow::Result<()> {
        info!(user_id, "unsubscribing blocked user from everything");
        Ok(())
    }
}

/// English-only message catalog.
pub struct EnglishOnlyCatalog;

impl MessageCatalog for EnglishOnlyCatalog {
    fn feed_deactivated_warning(&self, _lang: &str) -> String {
        "This feed has been deactivated due to repeated fetch failures.".to_string()
    }
}

/// Builds a handful of seeded demo feeds, used by `main` when no real
/// persistence layer is wired in.
pub fn seed_demo_feeds(store: &InMemoryFeedStore) {
    for (id, link) in [(1u64, "https://example.com/feed-a"), (2, "https://example.com/feed-b")] {
        let feed = Feed {
            id,
            link: link.to_string(),
            title: format!("Demo feed {id}"),
            etag: None,
            last_modified: None,
            updated_at: Utc::now(),
            entry_hashes: None,
            error_count: 0,
            next_check_time: None,
            interval: None,
        };
        let subs = vec![Sub {
            user_id: 1000 + id,
            feed_id: id,
            state: shared::model::SubState::Active,
            title: None,
            notify: true,
        }];
        store.seed(feed, subs);
    }
}
