//! Per-feed fetch-and-diff pass, the largest single component.
//!
//! Grounded in `_do_monitor_a_feed`: skip-by-schedule and no-subscriber
//! short circuits happen before any network call; the fetch result then
//! drives one of six terminal outcomes (cached/failed/deactivated/empty/
//! not-updated/updated). Regardless of which outcome is hit, an epilogue
//! always runs: reset the error streak and check for a URL migration on any
//! error-free response (even a 304), then persist whichever fields actually
//! changed. Only the "updated" outcome proceeds to fan out entries.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, error, warn};

use shared::model::{Entry, Feed, FeedField};
use shared::time::{parse_rfc2822_or_8601, to_rfc2822};
use shared::utils::{calculate_update, hash_retention_cap};
use shared::web::WebFeed;

use crate::context::MonitorContext;
use crate::fanout::DeliveryFanout;

enum Outcome {
    Cached,
    Failed,
    Deactivated,
    Empty,
    NotUpdated,
    Updated(Vec<Entry>),
}

pub struct UpdateDetector {
    ctx: MonitorContext,
}

impl UpdateDetector {
    pub fn new(ctx: MonitorContext) -> Self {
        Self { ctx }
    }

    pub async fn check_feed(&self, feed_id: u64) -> anyhow::Result<()> {
        let Some(mut feed) = self.ctx.store.get_by_id(feed_id).await? else {
            error!(feed_id, "feed not found, but it was submitted to the monitor queue");
            return Ok(());
        };

        let now = self.ctx.clock.now();

        if let Some(next_check) = feed.next_check_time {
            if now < next_check {
                self.ctx.stats.lock().unwrap().skipped();
                return Ok(());
            }
        }

        let subs = self.ctx.store.active_subs(feed_id).await?;
        if subs.is_empty() {
            warn!(feed_id, link = %feed.link, "feed has no active subscribers");
            self.ctx.utilities.update_interval(&feed).await?;
            self.ctx.stats.lock().unwrap().skipped();
            return Ok(());
        }

        let mut all_flood_locked = true;
        for sub in &subs {
            if !self.ctx.flood_locks.is_locked(sub.user_id).await {
                all_flood_locked = false;
                break;
            }
        }
        if all_flood_locked {
            self.ctx.stats.lock().unwrap().skipped();
            return Ok(());
        }

        let mut headers = std::collections::HashMap::new();
        headers.insert(
            "If-Modified-Since".to_string(),
            to_rfc2822(feed.last_modified.unwrap_or(feed.updated_at)),
        );
        if let Some(etag) = &feed.etag {
            headers.insert("If-None-Match".to_string(), etag.clone());
        }

        let wf = self.ctx.fetcher.feed_get(&feed.link, headers).await;

        let mut no_error = true;
        let mut new_next_check_time: Option<DateTime<Utc>> = None;
        let mut dirty = HashSet::new();

        let outcome = self
            .classify(&mut feed, &subs, &wf, now, &mut no_error, &mut new_next_check_time, &mut dirty)
            .await?;

        self.run_epilogue(&mut feed, &wf, no_error, new_next_check_time, &mut dirty).await?;

        {
            let mut stats = self.ctx.stats.lock().unwrap();
            match &outcome {
                Outcome::Cached => stats.cached(),
                Outcome::Failed | Outcome::Deactivated => stats.failed(),
                Outcome::Empty => stats.empty(),
                Outcome::NotUpdated => stats.not_updated(),
                Outcome::Updated(_) => stats.updated(),
            }
        }

        if let Outcome::Updated(entries) = outcome {
            let fanout = DeliveryFanout::new(self.ctx.clone());
            let entries: Vec<_> = entries.iter().collect();
            fanout.notify_all(&feed, &subs, &entries).await;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn classify(
        &self,
        feed: &mut Feed,
        subs: &[shared::model::Sub],
        wf: &WebFeed,
        now: DateTime<Utc>,
        no_error: &mut bool,
        new_next_check_time: &mut Option<DateTime<Utc>>,
        dirty: &mut HashSet<FeedField>,
    ) -> anyhow::Result<Outcome> {
        if wf.status == 304 {
            debug!(link = %feed.link, "fetched (not updated, cached)");
            return Ok(Outcome::Cached);
        }

        let Some(doc) = &wf.rss_d else {
            *no_error = false;
            feed.error_count += 1;
            dirty.insert(FeedField::ErrorCount);

            let tunables = &self.ctx.config.tunables;
            if feed.error_count % tunables.error_warn_threshold == 0 {
                warn!(link = %feed.link, retries = feed.error_count, error = ?wf.error, "fetch failed repeatedly");
            }
            if feed.error_count >= tunables.error_deactivate_threshold {
                error!(link = %feed.link, retries = feed.error_count, "deactivating feed after sustained failure");
                let reason = wf.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                let fanout = DeliveryFanout::new(self.ctx.clone());
                fanout.deactivate_and_notify_all(feed, subs, &reason).await;
                return Ok(Outcome::Deactivated);
            }
            if feed.error_count >= tunables.error_backoff_threshold {
                let interval = feed.interval.unwrap_or(self.ctx.config.effective_options.default_interval);
                let backoff_minutes = interval.min(15) * (feed.error_count / tunables.error_backoff_threshold + 1).min(5);
                if backoff_minutes > interval {
                    *new_next_check_time = Some(now + ChronoDuration::minutes(backoff_minutes as i64));
                }
            }
            debug!(link = %feed.link, retries = feed.error_count, error = ?wf.error, "fetch failed");
            return Ok(Outcome::Failed);
        };

        let wr = wf.web_response.as_ref();

        if let Some(etag) = wr.and_then(|wr| wr.etag.as_deref()) {
            if feed.etag.as_deref() != Some(etag) {
                feed.etag = Some(etag.to_string());
                dirty.insert(FeedField::Etag);
            }
        }

        *new_next_check_time = self.defer_next_check_as_per_server_side_cache(wf, now);

        if doc.entries.is_empty() {
            debug!(link = %feed.link, "fetched (not updated, empty)");
            return Ok(Outcome::Empty);
        }

        let title = doc.feed.title.as_deref().map(str::trim).unwrap_or("");
        if title != feed.title {
            debug!(old = %feed.title, new = title, link = %feed.link, "feed title changed");
            feed.title = title.to_string();
            dirty.insert(FeedField::Title);
        }

        let (new_hashes, fresh_entries) = calculate_update(feed.entry_hashes.as_deref(), &doc.entries);
        if fresh_entries.is_empty() {
            debug!(link = %feed.link, "fetched (not updated)");
            return Ok(Outcome::NotUpdated);
        }

        debug!(link = %feed.link, count = fresh_entries.len(), "updated");
        feed.last_modified = wr.and_then(|wr| wr.last_modified);
        let cap = hash_retention_cap(doc.entries.len(), self.ctx.config.tunables.hash_retention_floor);
        feed.entry_hashes = Some(new_hashes.into_iter().take(cap).collect());
        dirty.insert(FeedField::LastModified);
        dirty.insert(FeedField::EntryHashes);
        let updated_entries = fresh_entries.into_iter().cloned().collect();

        Ok(Outcome::Updated(updated_entries))
    }

    /// Cloudflare edge-cache and RSSHub TTL-driven deferral.
    fn defer_next_check_as_per_server_side_cache(&self, wf: &WebFeed, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let wr = wf.web_response.as_ref()?;

        if let Some(expires) = wr.expires {
            let cf_status = wf.headers.get("cf-cache-status").map(String::as_str);
            if matches!(cf_status, Some("HIT") | Some("MISS") | Some("EXPIRED") | Some("REVALIDATED")) && expires > now {
                return Some(expires);
            }
        }

        let doc = wf.rss_d.as_ref()?;
        if doc.feed.generator.as_deref() != Some("RSSHub") {
            return None;
        }
        let updated_str = doc.feed.updated.as_deref()?;

        let floor = self.ctx.config.tunables.rsshub_ttl_floor_secs;
        let ttl_secs = doc
            .feed
            .ttl
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|minutes| minutes * 60)
            .or(wr.max_age);
        let ttl_secs = ttl_secs?;
        if ttl_secs <= floor {
            return None;
        }

        let updated = parse_rfc2822_or_8601(updated_str)?;
        let next_check = updated + ChronoDuration::seconds(ttl_secs);
        (next_check > now).then_some(next_check)
    }

    async fn run_epilogue(
        &self,
        feed: &mut Feed,
        wf: &WebFeed,
        no_error: bool,
        new_next_check_time: Option<DateTime<Utc>>,
        dirty: &mut HashSet<FeedField>,
    ) -> anyhow::Result<()> {
        if no_error {
            if feed.error_count > 0 {
                feed.error_count = 0;
                dirty.insert(FeedField::ErrorCount);
            }
            if wf.url != feed.link {
                if let Some(migrated) = self.ctx.utilities.migrate_to_new_url(feed, &wf.url).await? {
                    *feed = migrated;
                }
            }
        }

        if new_next_check_time != feed.next_check_time {
            feed.next_check_time = new_next_check_time;
            dirty.insert(FeedField::NextCheckTime);
        }

        if !dirty.is_empty() {
            let fields: Vec<_> = dirty.iter().copied().collect();
            self.ctx.store.save(feed, &fields).await?;
        }

        Ok(())
    }
}
