//! Two-tier rolling statistics for classified feed-check outcomes.
//!
//! The original counts outcomes in a dynamic `Counter[str, int]` so it gets
//! both summability (`+=` across counters) and structured field access for
//! free. This reimplementation uses a fixed struct of named counters plus an
//! explicit [`MonitoringCounter::merge_from`], per the counter-as-record
//! design note.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// A single outcome tally. All fields are monotonically incrementing within
/// a tier; tiers are folded and reset by [`StatsAggregator::print_summary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitoringCounter {
    pub sum: u64,
    pub not_updated: u64,
    pub cached: u64,
    pub empty: u64,
    pub failed: u64,
    pub updated: u64,
    pub skipped: u64,
    pub timeout: u64,
    pub cancelled: u64,
    pub unknown_error: u64,
    pub timeout_unknown_error: u64,
    pub deferred: u64,
    pub resubmitted: u64,
}

impl MonitoringCounter {
    fn merge_from(&mut self, other: &Self) {
        self.sum += other.sum;
        self.not_updated += other.not_updated;
        self.cached += other.cached;
        self.empty += other.empty;
        self.failed += other.failed;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.timeout += other.timeout;
        self.cancelled += other.cancelled;
        self.unknown_error += other.unknown_error;
        self.timeout_unknown_error += other.timeout_unknown_error;
        self.deferred += other.deferred;
        self.resubmitted += other.resubmitted;
    }

    fn has_anomalies(&self) -> bool {
        self.cancelled > 0 || self.unknown_error > 0 || self.timeout > 0 || self.timeout_unknown_error > 0
    }

    /// Renders the fixed-order summary line.
    fn describe(&self) -> String {
        let mut parts = vec![format!("updated({})", self.updated)];
        parts.push(format!(
            "not updated({}, including {} cached and {} empty)",
            self.not_updated, self.cached, self.empty
        ));
        let optional = [
            ("fetch failed", self.failed),
            ("skipped", self.skipped),
            ("cancelled", self.cancelled),
            ("unknown error", self.unknown_error),
            ("timeout", self.timeout),
            ("timeout w/ unknown error", self.timeout_unknown_error),
            ("deferred", self.deferred),
            ("resubmitted", self.resubmitted),
        ];
        for (label, count) in optional {
            if count > 0 {
                parts.push(format!("{label}({count})"));
            }
        }
        parts.join(", ")
    }
}

const TIER1_SUMMARY_PERIOD: Duration = Duration::from_secs(600);

/// Tracks classified outcomes of feed checks and periodically logs rollups.
///
/// Tier-2 is reset on every [`print_summary`](Self::print_summary) call
/// (driven by [`crate::driver::PeriodicDriver`]'s tick); tier-1 accumulates
/// tier-2 and is only reset once `TIER1_SUMMARY_PERIOD` has elapsed.
pub struct StatsAggregator {
    tier1: MonitoringCounter,
    tier2: MonitoringCounter,
    tier1_last_emit: Option<Instant>,
    tier2_last_emit: Option<Instant>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            tier1: MonitoringCounter::default(),
            tier2: MonitoringCounter::default(),
            tier1_last_emit: None,
            tier2_last_emit: None,
        }
    }

    fn record(&mut self, f: impl FnOnce(&mut MonitoringCounter)) {
        f(&mut self.tier2);
        self.tier2.sum += 1;
    }

    pub fn not_updated(&mut self) {
        self.record(|c| c.not_updated += 1);
    }

    pub fn cached(&mut self) {
        self.tier2.cached += 1;
        self.not_updated();
    }

    pub fn empty(&mut self) {
        self.tier2.empty += 1;
        self.not_updated();
    }

    pub fn failed(&mut self) {
        self.record(|c| c.failed += 1);
    }

    pub fn updated(&mut self) {
        self.record(|c| c.updated += 1);
    }

    pub fn skipped(&mut self) {
        self.record(|c| c.skipped += 1);
    }

    pub fn timeout(&mut self) {
        self.record(|c| c.timeout += 1);
    }

    pub fn cancelled(&mut self) {
        self.record(|c| c.cancelled += 1);
    }

    pub fn unknown_error(&mut self) {
        self.record(|c| c.unknown_error += 1);
    }

    pub fn timeout_unknown_error(&mut self) {
        self.record(|c| c.timeout_unknown_error += 1);
    }

    /// Open Question (a): `deferred`/`resubmitted` also bump `SUM`, double
    /// counting volume against the ten terminal outcomes. Preserved as-is.
    pub fn deferred(&mut self) {
        self.record(|c| c.deferred += 1);
    }

    pub fn resubmitted(&mut self) {
        self.record(|c| c.resubmitted += 1);
    }

    fn summarize(counter: &MonitoringCounter, elapsed: Duration, is_tier1: bool) {
        if counter.sum == 0 {
            debug!("No monitoring task in the past {}s.", elapsed.as_secs());
            return;
        }
        let message = format!(
            "Summary of {} monitoring tasks in the past {}s: {}",
            counter.sum,
            elapsed.as_secs(),
            counter.describe()
        );
        if counter.has_anomalies() {
            warn!("{message}");
        } else if is_tier1 {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }

    /// Called once per driver tick.
    pub fn print_summary(&mut self) {
        let now = Instant::now();

        if self.tier1_last_emit.is_none() {
            self.tier1_last_emit = Some(now);
            self.tier2_last_emit = Some(now);
            return;
        }

        let tier2_elapsed = now.duration_since(self.tier2_last_emit.unwrap());
        Self::summarize(&self.tier2, tier2_elapsed, false);
        self.tier2_last_emit = Some(now);
        let tier2 = std::mem::take(&mut self.tier2);
        self.tier1.merge_from(&tier2);

        let tier1_elapsed = now.duration_since(self.tier1_last_emit.unwrap());
        if tier1_elapsed < TIER1_SUMMARY_PERIOD {
            return;
        }
        Self::summarize(&self.tier1, tier1_elapsed, true);
        self.tier1_last_emit = Some(now);
        self.tier1 = MonitoringCounter::default();
    }

    #[cfg(test)]
    pub fn tier2_snapshot(&self) -> MonitoringCounter {
        self.tier2
    }

    #[cfg(test)]
    pub fn tier1_snapshot(&self) -> MonitoringCounter {
        self.tier1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_and_empty_also_bump_not_updated() {
        let mut stats = StatsAggregator::new();
        stats.cached();
        stats.empty();
        let snap = stats.tier2_snapshot();
        assert_eq!(snap.cached, 1);
        assert_eq!(snap.empty, 1);
        assert_eq!(snap.not_updated, 2);
        assert_eq!(snap.sum, 2);
    }

    #[test]
    fn deferred_and_resubmitted_also_bump_sum() {
        let mut stats = StatsAggregator::new();
        stats.deferred();
        stats.resubmitted();
        let snap = stats.tier2_snapshot();
        assert_eq!(snap.deferred, 1);
        assert_eq!(snap.resubmitted, 1);
        assert_eq!(snap.sum, 2);
    }

    #[test]
    fn first_print_summary_only_sets_baseline() {
        let mut stats = StatsAggregator::new();
        stats.updated();
        stats.print_summary();
        // Tier-2 untouched by the baseline call.
        assert_eq!(stats.tier2_snapshot().sum, 1);
        assert_eq!(stats.tier1_snapshot().sum, 0);
    }

    #[test]
    fn second_print_summary_folds_tier2_into_tier1_and_resets_tier2() {
        let mut stats = StatsAggregator::new();
        stats.print_summary(); // baseline
        stats.updated();
        stats.failed();
        stats.print_summary();
        assert_eq!(stats.tier2_snapshot().sum, 0);
        assert_eq!(stats.tier1_snapshot().sum, 2);
        assert_eq!(stats.tier1_snapshot().updated, 1);
        assert_eq!(stats.tier1_snapshot().failed, 1);
    }

    #[test]
    fn describe_lists_zero_tags_only_when_nonzero() {
        let mut counter = MonitoringCounter::default();
        counter.updated = 3;
        counter.not_updated = 2;
        counter.cached = 1;
        counter.empty = 1;
        let text = counter.describe();
        assert!(text.contains("updated(3)"));
        assert!(text.contains("not updated(2, including 1 cached and 1 empty)"));
        assert!(!text.contains("failed"));
        assert!(!text.contains("skipped"));
    }

    #[test]
    fn anomalous_counts_are_flagged() {
        let mut counter = MonitoringCounter::default();
        assert!(!counter.has_anomalies());
        counter.timeout = 1;
        assert!(counter.has_anomalies());
    }
}
