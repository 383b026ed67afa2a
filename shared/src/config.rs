//! Tunable configuration loaded from `tunables.toml`.
//!
//! Mirrors how this codebase's `AgentConfig` is laid out: one struct,
//! `serde(default = "...")` per field backed by [`crate::defaults`], loaded
//! with `toml::from_str` rather than hand-parsed.

use serde::{Deserialize, Serialize};

use crate::defaults::*;

/// Fixed tunables for the monitor's runtime behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tunables {
    /// Hard timeout for a single feed check, in seconds.
    #[serde(default = "default_monitor_timeout_secs")]
    pub monitor_timeout_secs: u64,
    /// Per-subscriber send timeout, in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Consecutive-failure count at which a warning is logged.
    #[serde(default = "default_error_warn_threshold")]
    pub error_warn_threshold: u32,
    /// Consecutive-failure count at which back-off scheduling begins.
    #[serde(default = "default_error_backoff_threshold")]
    pub error_backoff_threshold: u32,
    /// Consecutive-failure count at which a feed is auto-deactivated.
    #[serde(default = "default_error_deactivate_threshold")]
    pub error_deactivate_threshold: u32,
    /// Minimum RSSHub TTL, in seconds, honored for cache-driven deferral.
    #[serde(default = "default_rsshub_ttl_floor_secs")]
    pub rsshub_ttl_floor_secs: i64,
    /// Consecutive blocked-style send failures tolerated before unsubscribing.
    #[serde(default = "default_blocked_tolerance")]
    pub blocked_tolerance: u32,
    /// Floor on retained entry-hash count, regardless of entry count.
    #[serde(default = "default_hash_retention_floor")]
    pub hash_retention_floor: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            monitor_timeout_secs: default_monitor_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            error_warn_threshold: default_error_warn_threshold(),
            error_backoff_threshold: default_error_backoff_threshold(),
            error_deactivate_threshold: default_error_deactivate_threshold(),
            rsshub_ttl_floor_secs: default_rsshub_ttl_floor_secs(),
            blocked_tolerance: default_blocked_tolerance(),
            hash_retention_floor: default_hash_retention_floor(),
        }
    }
}

/// Scheduler-wide knobs externally owned by `EffectiveOptions`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EffectiveOptions {
    /// Minimum minutes between any two checks of the same feed. Locking
    /// Locking only takes effect when this is greater than 1.
    #[serde(default = "default_minimal_interval_minutes")]
    pub minimal_interval: u32,
    /// Minutes between checks when a feed has no explicit `interval`.
    #[serde(default = "default_interval_minutes")]
    pub default_interval: u32,
}

impl Default for EffectiveOptions {
    fn default() -> Self {
        Self {
            minimal_interval: default_minimal_interval_minutes(),
            default_interval: default_interval_minutes(),
        }
    }
}

/// Top-level config file shape (`tunables.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub effective_options: EffectiveOptions,
}

impl MonitorConfig {
    /// Loads configuration from a TOML file, falling back to all defaults if
    /// `path` does not exist.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "tunables file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::MonitoringError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| crate::MonitoringError::Config(format!("failed to parse {}: {e}", path.display())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let t = Tunables::default();
        assert_eq!(t.monitor_timeout_secs, 600);
        assert_eq!(t.send_timeout_secs, 510);
        assert_eq!(t.error_warn_threshold, 20);
        assert_eq!(t.error_backoff_threshold, 10);
        assert_eq!(t.error_deactivate_threshold, 100);
        assert_eq!(t.rsshub_ttl_floor_secs, 300);
        assert_eq!(t.blocked_tolerance, 5);
        assert_eq!(t.hash_retention_floor, 100);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = MonitorConfig::load(std::path::Path::new("/nonexistent/tunables.toml")).unwrap();
        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    fn load_parses_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunables.toml");
        std::fs::write(&path, "[tunables]\nblocked_tolerance = 3\n").unwrap();
        let cfg = MonitorConfig::load(&path).unwrap();
        assert_eq!(cfg.tunables.blocked_tolerance, 3);
        assert_eq!(cfg.tunables.monitor_timeout_secs, 600);
    }
}
