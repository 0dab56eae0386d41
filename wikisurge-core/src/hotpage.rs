//! Hot-page promotion tracker: decides which pages justify detailed
//! tracking and maintains per-page short-window statistics. The gate that
//! keeps the heavier detectors from attending to the long tail of the
//! firehose.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::Result;
use crate::model::{EditEvent, PageStats};
use crate::store::{Keys, Store};

#[derive(Debug, Clone, Copy)]
pub struct HotPageConfig {
    pub promotion_threshold: u64,
    pub window: Duration,
    pub max_tracked: usize,
    pub max_members_per_page: usize,
    pub cleanup_interval: Duration,
}

impl Default for HotPageConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 10,
            window: Duration::from_secs(3600),
            max_tracked: 500,
            max_members_per_page: 200,
            cleanup_interval: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageStatsView {
    pub stats: PageStats,
    pub server_url: String,
}

/// Gate that promotes pages into detailed tracking once their short-window
/// activity crosses `PromotionThreshold`, and demotes them again once the
/// window's worth of activity has passed without a refresh.
pub struct HotPageTracker {
    store: Store,
    config: HotPageConfig,
    clock: SharedClock,
    cancel: CancellationToken,
}

impl std::fmt::Debug for HotPageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotPageTracker")
            .field("config", &self.config)
            .finish()
    }
}

impl HotPageTracker {
    pub fn new(store: Store, config: HotPageConfig, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            clock,
            cancel: CancellationToken::new(),
        })
    }

    /// Atomically folds one edit into the page's rolling window: bumps the
    /// activity counter, adds the editor to the bounded set, refreshes the
    /// 5-min/1-h stats, and promotes the page to "hot" if warranted.
    pub async fn observe(&self, edit: &EditEvent) -> Result<()> {
        let page = edit.title.as_str();
        let now_ms = self.clock.now_utc().timestamp_millis();
        let window_ms = self.config.window.as_millis() as i64;

        let ts_key = Keys::hot_timestamps(page);
        let member = format!("{now_ms}-{}", Uuid::new_v4());
        self.store.zadd(&ts_key, &member, now_ms as f64).await?;
        self.store
            .zremrangebyscore(&ts_key, f64::MIN, (now_ms - window_ms) as f64)
            .await?;
        self.store.expire(&ts_key, self.config.window).await?;

        let edits_5min = self
            .store
            .zcount(&ts_key, (now_ms - 300_000) as f64, f64::MAX)
            .await?;
        let edits_1h = self
            .store
            .zcount(&ts_key, (now_ms - 3_600_000) as f64, f64::MAX)
            .await?;
        let activity = self
            .store
            .zcount(&ts_key, (now_ms - window_ms) as f64, f64::MAX)
            .await?;

        let editors_len = self
            .store
            .sadd_bounded(
                &Keys::hot_editors(page),
                &edit.user,
                self.config.max_members_per_page,
                self.config.window,
            )
            .await?;

        self.store
            .hset_many(
                &Keys::hot_stats(page),
                &[
                    ("edits_5min", edits_5min.to_string()),
                    ("edits_1h", edits_1h.to_string()),
                    ("server_url", edit.server_url.clone()),
                ],
                self.config.window,
            )
            .await?;
        self.store
            .set_string(
                &Keys::hot_activity(page),
                &activity.to_string(),
                Some(self.config.window),
            )
            .await?;

        let _ = editors_len;

        let already_hot = self.store.exists(&Keys::hot_marker(page)).await?;
        if already_hot {
            // refresh the marker so it keeps pace with ongoing activity
            self.store
                .set_string(&Keys::hot_marker(page), "1", Some(self.config.window))
                .await?;
            return Ok(());
        }

        if activity < self.config.promotion_threshold {
            return Ok(());
        }

        let tracked = self.store.scard(Keys::hot_tracked_set()).await?;
        if tracked as usize >= self.config.max_tracked {
            debug!(page, tracked, "promotion rejected: MaxTracked reached");
            return Ok(());
        }

        self.store
            .set_string(&Keys::hot_marker(page), "1", Some(self.config.window))
            .await?;
        self.store.sadd(Keys::hot_tracked_set(), page).await?;
        info!(page, activity, "page promoted to hot");
        Ok(())
    }

    pub async fn is_hot(&self, page: &str) -> Result<bool> {
        self.store.exists(&Keys::hot_marker(page)).await
    }

    pub async fn get_page_stats(&self, page: &str) -> Result<Option<PageStatsView>> {
        let hash = self.store.hgetall(&Keys::hot_stats(page)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        let edits_5min = hash.get("edits_5min").and_then(|v| v.parse().ok()).unwrap_or(0);
        let edits_1h = hash.get("edits_1h").and_then(|v| v.parse().ok()).unwrap_or(0);
        let editors = self.store.scard(&Keys::hot_editors(page)).await?;
        let server_url = hash.get("server_url").cloned().unwrap_or_default();

        Ok(Some(PageStatsView {
            stats: PageStats {
                edits_5min,
                edits_1h,
                editors,
            },
            server_url,
        }))
    }

    /// Spawn the background cleaner that scans for pages whose marker has
    /// expired and removes their entry from the tracked set so `MaxTracked`
    /// frees up. Returns the task handle; call `shutdown` to stop it.
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.config.cleanup_interval);
            loop {
                tokio::select! {
                    _ = tracker.cancel.cancelled() => {
                        info!("hot-page cleanup task stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = tracker.run_cleanup_pass().await {
                            warn!(error = %err, "hot-page cleanup pass failed");
                        }
                    }
                }
            }
        })
    }

    async fn run_cleanup_pass(&self) -> Result<()> {
        let tracked = self.store.smembers(Keys::hot_tracked_set()).await?;
        for page in tracked {
            if !self.store.exists(&Keys::hot_marker(&page)).await? {
                self.store.srem(Keys::hot_tracked_set(), &page).await?;
                debug!(page = %page, "hot-page tracking expired, removed from tracked set");
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = HotPageConfig::default();
        assert_eq!(cfg.window, Duration::from_secs(3600));
        assert!(cfg.max_members_per_page > 0);
    }
}
