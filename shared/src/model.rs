//! Core data model shared by the monitor core and its external collaborators.
//!
//! `Feed` and `Sub` mirror the read-mostly records the monitor observes; the
//! monitor never creates or destroys them, it only ever updates the fields
//! listed on `Feed` through `FeedStore::save`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A syndication feed (RSS/Atom) tracked by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feed {
    /// Stable integer identity.
    pub id: u64,
    /// Canonical URL used for fetching.
    pub link: String,
    /// Last known feed title.
    pub title: String,
    /// HTTP `ETag` validator from the last successful fetch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub etag: Option<String>,
    /// HTTP `Last-Modified` validator from the last successful fetch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Last time this feed was successfully observed.
    pub updated_at: DateTime<Utc>,
    /// Fingerprints of recently seen entries, newest first.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entry_hashes: Option<Vec<String>>,
    /// Consecutive fetch-failure counter; resets to 0 on success.
    #[serde(default)]
    pub error_count: u32,
    /// Earliest time the next check may run.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_check_time: Option<DateTime<Utc>>,
    /// Desired minutes between checks, or `None` for the configured default.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub interval: Option<u32>,
}

/// Individual fields of [`Feed`] that an `UpdateDetector` pass may have dirtied.
///
/// Passed to `FeedStore::save` so the adapter persists exactly the fields
/// that changed, never a blind full-row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedField {
    Etag,
    Title,
    ErrorCount,
    NextCheckTime,
    LastModified,
    EntryHashes,
}

/// Whether a subscription is actively receiving deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubState {
    Inactive,
    Active,
}

/// A subscription linking one feed to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sub {
    pub user_id: u64,
    pub feed_id: u64,
    pub state: SubState,
    /// Per-subscription title override, falls back to `Feed::title` when absent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    /// Whether new posts should be delivered with a notification (vs. silently).
    #[serde(default = "default_true")]
    pub notify: bool,
}

fn default_true() -> bool {
    true
}

/// A single item within a feed, as produced by the (external) feed parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<String>,
}

/// A rendered post ready to be delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub title: Option<String>,
    pub body: String,
    pub link: Option<String>,
    pub feed_title: String,
    pub feed_link: String,
    pub author: Option<String>,
}

impl Post {
    pub fn new(body: impl Into<String>, feed_title: impl Into<String>, feed_link: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
            link: None,
            feed_title: feed_title.into(),
            feed_link: feed_link.into(),
            author: None,
        }
    }
}
