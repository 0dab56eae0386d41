//! Spike detector: flags sudden accelerations in a page's edit rate
//! relative to its own recent baseline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::error::Result;
use crate::hotpage::HotPageTracker;
use crate::model::{EditEvent, Severity, SpikeAlert};
use crate::store::{Keys, Store};

const MAX_COOLDOWN_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct SpikeConfig {
    pub minimum_edits: u64,
    pub ratio_threshold: f64,
    pub cooldown: Duration,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            minimum_edits: 3,
            ratio_threshold: 5.0,
            cooldown: Duration::from_secs(600),
        }
    }
}

fn severity_for_ratio(ratio: f64) -> Severity {
    if ratio >= 50.0 {
        Severity::Critical
    } else if ratio >= 20.0 {
        Severity::High
    } else if ratio >= 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub struct SpikeDetector {
    store: Store,
    hot_pages: Arc<HotPageTracker>,
    config: SpikeConfig,
    clock: SharedClock,
    cooldowns: Mutex<HashMap<String, std::time::Instant>>,
}

impl std::fmt::Debug for SpikeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpikeDetector")
            .field("config", &self.config)
            .finish()
    }
}

impl SpikeDetector {
    pub fn new(
        store: Store,
        hot_pages: Arc<HotPageTracker>,
        config: SpikeConfig,
        clock: SharedClock,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hot_pages,
            config,
            clock,
            cooldowns: Mutex::new(HashMap::new()),
        })
    }

    /// Evaluate one edit on a hot page for a rate spike, returning the
    /// alert if one was emitted. Returns `Ok(None)` on a threshold miss,
    /// which is distinct from an error: the caller should not treat it as
    /// a failed observation.
    pub async fn observe(&self, edit: &EditEvent) -> Result<Option<SpikeAlert>> {
        let page = edit.title.as_str();

        if !self.hot_pages.is_hot(page).await? {
            return Ok(None);
        }

        let Some(view) = self.hot_pages.get_page_stats(page).await? else {
            return Ok(None);
        };

        let rate_5m = view.stats.edits_5min as f64 / 5.0;
        let rate_1h = view.stats.edits_1h as f64 / 60.0;
        let baseline = rate_1h.max(0.1);
        let ratio = rate_5m / baseline;

        if view.stats.edits_5min < self.config.minimum_edits || ratio < self.config.ratio_threshold
        {
            return Ok(None);
        }

        if !self.check_and_refresh_cooldown(page) {
            return Ok(None);
        }

        let alert = SpikeAlert {
            page: page.to_string(),
            ratio,
            edits_5min: view.stats.edits_5min,
            edits_1h: view.stats.edits_1h,
            severity: severity_for_ratio(ratio),
            timestamp: self.clock.now_utc(),
            unique_editors: view.stats.editors,
            server_url: view.server_url,
        };

        self.publish(&alert).await?;
        info!(page, ratio, severity = %alert.severity, "spike alert emitted");
        Ok(Some(alert))
    }

    async fn publish(&self, alert: &SpikeAlert) -> Result<()> {
        let payload = serde_json::to_string(alert)?;
        self.store
            .xadd_bounded(
                Keys::alerts_spikes(),
                &[
                    ("data", payload),
                    ("severity", alert.severity.to_string()),
                    ("page", alert.page.clone()),
                ],
                1000,
            )
            .await?;
        self.store
            .set_string(&Keys::spike_marker(&alert.page), "1", Some(Duration::from_secs(3600)))
            .await?;
        Ok(())
    }

    /// Returns `true` if a spike alert for this page may be published now,
    /// recording the cooldown start if so. Opportunistically evicts the
    /// oldest entries once the cooldown table grows past its cap.
    fn check_and_refresh_cooldown(&self, page: &str) -> bool {
        let now = self.clock.now_instant();
        let mut cooldowns = self.cooldowns.lock();

        if let Some(started) = cooldowns.get(page) {
            if now.duration_since(*started) < self.config.cooldown {
                return false;
            }
        }

        cooldowns.insert(page.to_string(), now);

        if cooldowns.len() > MAX_COOLDOWN_ENTRIES {
            let cutoff = self.config.cooldown;
            cooldowns.retain(|_, started| now.duration_since(*started) < cutoff);
            if cooldowns.len() > MAX_COOLDOWN_ENTRIES {
                warn!("spike cooldown table still over cap after eviction pass");
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds() {
        assert_eq!(severity_for_ratio(4.0), Severity::Low);
        assert_eq!(severity_for_ratio(10.0), Severity::Medium);
        assert_eq!(severity_for_ratio(20.0), Severity::High);
        assert_eq!(severity_for_ratio(50.0), Severity::Critical);
    }
}
