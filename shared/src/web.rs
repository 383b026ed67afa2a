//! Types describing the response shape of the external `Fetcher` collaborator.
//!
//! The monitor never performs HTTP I/O itself (fetching
//! and feed parsing out of scope); it only ever consumes values shaped like
//! these, produced by whatever adapter implements [`crate::traits::Fetcher`].

use chrono::{DateTime, Utc};

use crate::model::Entry;

/// Cache/validator metadata carried on a fetch response.
#[derive(Debug, Clone, Default)]
pub struct WebResponse {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    /// Time the response was observed; filled in by the detector right after
    /// the fetch completes (`wr.now = now` in the original).
    pub now: Option<DateTime<Utc>>,
}

/// Parsed feed-level metadata, as produced by the (external) feed parser.
#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub generator: Option<String>,
    pub updated: Option<String>,
    pub ttl: Option<String>,
}

/// A parsed RSS/Atom document.
#[derive(Debug, Clone, Default)]
pub struct RssDocument {
    pub feed: FeedMeta,
    pub entries: Vec<Entry>,
}

/// A fetch-layer failure, surfaced instead of a parsed document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WebError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("failed to parse feed: {0}")]
    ParseError(String),
    #[error("{0}")]
    Other(String),
}

/// The full result of one conditional feed fetch.
#[derive(Debug, Clone)]
pub struct WebFeed {
    pub status: u16,
    /// `None` when the fetch or parse failed.
    pub rss_d: Option<RssDocument>,
    pub web_response: Option<WebResponse>,
    /// The URL the response actually came from, after redirects.
    pub url: String,
    pub error: Option<WebError>,
    /// Raw response headers relevant to cache negotiation (lowercased keys).
    pub headers: std::collections::HashMap<String, String>,
}

impl WebFeed {
    pub fn not_modified(url: impl Into<String>) -> Self {
        Self {
            status: 304,
            rss_d: None,
            web_response: None,
            url: url.into(),
            error: None,
            headers: std::collections::HashMap::new(),
        }
    }

    pub fn failed(url: impl Into<String>, error: WebError) -> Self {
        Self {
            status: 0,
            rss_d: None,
            web_response: None,
            url: url.into(),
            error: Some(error),
            headers: std::collections::HashMap::new(),
        }
    }
}
