//! External-collaborator interfaces.
//!
//! Everything in this module is a contract the monitor core depends on but
//! never implements: persistence, HTTP fetching, feed/post rendering, and
//! message transport are all deliberately out of scope for this crate.
//! Production adapters (a real database, a real HTTP client, a real bot API)
//! live outside this codebase; `monitor`'s own test suite ships small
//! in-memory fakes of each trait instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{Entry, Feed, FeedField, Post, Sub};
use crate::web::WebFeed;

/// Persistence of feed/sub records. Out of scope here; this is the seam a
/// real database adapter plugs into.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Feed>>;
    async fn filter_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Feed>>;
    /// Persist exactly the listed fields of `feed`.
    async fn save(&self, feed: &Feed, fields: &[FeedField]) -> anyhow::Result<()>;
    /// Active (`state == Active`) subscriptions for a feed.
    async fn active_subs(&self, feed_id: u64) -> anyhow::Result<Vec<Sub>>;
    /// Language code for a user, used to localize the deactivation notice.
    async fn user_lang(&self, user_id: u64) -> anyhow::Result<String>;
}

/// Conditional HTTP fetch of a feed document. Out of scope here.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn feed_get(&self, link: &str, headers: HashMap<String, String>) -> WebFeed;
}

/// Entry → post rendering. Out of scope here.
pub trait Parser: Send + Sync {
    fn get_post_from_entry(&self, entry: &Entry, feed_title: &str, feed_link: &str) -> anyhow::Result<Post>;
}

/// Errors a [`Transport`] send can raise.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("entity not found")]
    EntityNotFound,
    #[error("user blocked the bot")]
    UserBlocked,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("send timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// Message delivery to a single user. Out of scope here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Verifies the user entity can still be resolved (has not blocked/left).
    async fn resolve_user(&self, user_id: u64) -> Result<(), SendError>;
    async fn send_post(&self, user_id: u64, post: &Post, notify: bool) -> Result<(), SendError>;
    /// Sends a plain-text operator-channel message (best-effort error reporting).
    async fn send_operator_message(&self, text: &str) -> Result<(), SendError>;
}

/// Supplies the set of feed ids due for a check on this tick.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn get_tasks(&self) -> anyhow::Result<Vec<u64>>;
}

/// Per-user flood-wait indicator: when held, delivery to that user is skipped.
#[async_trait]
pub trait FloodLocks: Send + Sync {
    async fn is_locked(&self, user_id: u64) -> bool;
}

/// Miscellaneous feed-lifecycle hooks the detector invokes.
#[async_trait]
pub trait FeedUtilities: Send + Sync {
    /// Called when a feed has no active subscribers, to let external interval
    /// logic extend its schedule.
    async fn update_interval(&self, feed: &Feed) -> anyhow::Result<()>;
    /// Called when the fetched URL differs from `feed.link`; may return a
    /// replacement feed record to adopt.
    async fn migrate_to_new_url(&self, feed: &Feed, new_url: &str) -> anyhow::Result<Option<Feed>>;
    /// Marks a feed inactive after sustained fetch failure.
    async fn deactivate_feed(&self, feed: &Feed) -> anyhow::Result<()>;
    /// Unsubscribes a user from everything and leaves their chat.
    async fn unsub_all_and_leave_chat(&self, user_id: u64) -> anyhow::Result<()>;
}

/// A UTC clock, abstracted so tests can control "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Localized message lookup for the feed-deactivation notice.
pub trait MessageCatalog: Send + Sync {
    fn feed_deactivated_warning(&self, lang: &str) -> String;
}
