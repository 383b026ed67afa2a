//! Default values for configuration parameters.
//!
//! Centralizes the default-value functions used by [`crate::config`]'s
//! `#[serde(default = "...")]` attributes, the same way the agent crate's
//! own `defaults.rs` centralizes task-timeout defaults.

/// Hard timeout for a single feed check: 600s.
pub fn default_monitor_timeout_secs() -> u64 {
    600
}

/// Per-subscriber send timeout: 510s / 8.5 min.
pub fn default_send_timeout_secs() -> u64 {
    510
}

/// Consecutive-failure count at which a warning is logged.
pub fn default_error_warn_threshold() -> u32 {
    20
}

/// Consecutive-failure count at which back-off scheduling begins.
pub fn default_error_backoff_threshold() -> u32 {
    10
}

/// Consecutive-failure count at which a feed is auto-deactivated.
pub fn default_error_deactivate_threshold() -> u32 {
    100
}

/// Minimum RSSHub TTL, in seconds, honored for cache-driven deferral.
pub fn default_rsshub_ttl_floor_secs() -> i64 {
    300
}

/// Consecutive blocked-style send failures tolerated before unsubscribing.
pub fn default_blocked_tolerance() -> u32 {
    5
}

/// Floor on retained entry-hash count, regardless of entry count.
pub fn default_hash_retention_floor() -> usize {
    100
}

/// Default minutes between checks when a feed has no explicit interval.
pub fn default_interval_minutes() -> u32 {
    30
}

/// Default minimum minutes between any two checks of the same feed.
pub fn default_minimal_interval_minutes() -> u32 {
    5
}
