//! Shared data model, external-collaborator traits, and configuration for
//! the feed-monitoring system.
//!
//! This crate contains everything the monitor core (`monitor` crate) and its
//! adapters need to agree on: the `Feed`/`Sub`/`Entry` record shapes, the
//! trait contracts for persistence/fetching/transport, and the tunable
//! configuration.

pub mod config;
pub mod defaults;
pub mod model;
pub mod time;
pub mod traits;
pub mod utils;
pub mod web;

pub use model::{Entry, Feed, FeedField, Post, Sub, SubState};
pub use traits::{
    Clock, FeedStore, FeedUtilities, Fetcher, FloodLocks, MessageCatalog, Parser, SendError,
    SystemClock, TaskSource, Transport,
};

/// Result type alias used throughout the shared crate.
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the monitoring system.
#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("send error: {0}")]
    Send(String),

    #[error("internal error: {0}")]
    Internal(String),
}
