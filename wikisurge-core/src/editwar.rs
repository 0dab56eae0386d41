//! Edit-war detector: flags pages where multiple editors are repeatedly
//! reverting one another, rather than merely editing heavily.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::ConflictAnalyzer;
use crate::clock::SharedClock;
use crate::error::Result;
use crate::hotpage::HotPageTracker;
use crate::model::{EditEvent, EditWarAlert, Severity, TimelineEntry};
use crate::store::{Keys, Store};
use crate::timeline::read_timeline;

const MAX_COOLDOWN_ENTRIES: usize = 500;
const CHANGES_HISTORY_LEN: isize = 100;
const TIMELINE_HISTORY_LEN: isize = 100;
const TIMELINE_TTL: Duration = Duration::from_secs(12 * 3600);

#[derive(Debug, Clone, Copy)]
pub struct EditWarConfig {
    pub min_editors: u64,
    pub min_edits: u64,
    pub min_reverts: u64,
    pub cooldown: Duration,
    pub reanalyze_every: u64,
    pub window: Duration,
    pub deactivation_sweep_interval: Duration,
}

impl Default for EditWarConfig {
    fn default() -> Self {
        Self {
            min_editors: 2,
            min_edits: 5,
            min_reverts: 2,
            cooldown: Duration::from_secs(300),
            reanalyze_every: 10,
            window: Duration::from_secs(600),
            deactivation_sweep_interval: Duration::from_secs(120),
        }
    }
}

fn severity_for(editor_count: u64, revert_count: u64) -> Severity {
    if editor_count > 5 || revert_count > 10 {
        Severity::Critical
    } else if editor_count > 3 || revert_count > 5 {
        Severity::High
    } else if editor_count > 2 || revert_count > 3 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn signs_differ(a: i64, b: i64) -> bool {
    (a > 0 && b < 0) || (a < 0 && b > 0)
}

/// Count reverts over the ordered byte-change sequence `editwar:changes:{p}`
/// holds. An adjacent pair `(c[i-1], c[i])` counts as a revert if:
///  1. both are zero (trivial-edit oscillation), or
///  2. signs differ and both magnitudes are under 10 (micro-revert), or
///  3. signs differ and the smaller magnitude is at least 60% of the
///     larger (similar-magnitude inverse change).
pub(crate) fn count_reverts(changes: &[i64]) -> u64 {
    let mut reverts = 0u64;
    for i in 1..changes.len() {
        let prev = changes[i - 1];
        let cur = changes[i];

        let trivial_oscillation = prev == 0 && cur == 0;
        let micro_revert = signs_differ(prev, cur) && prev.abs() < 10 && cur.abs() < 10;
        let similar_magnitude_inverse = signs_differ(prev, cur) && {
            let a = prev.unsigned_abs() as f64;
            let b = cur.unsigned_abs() as f64;
            a.min(b) / a.max(b).max(1.0) >= 0.6
        };

        if trivial_oscillation || micro_revert || similar_magnitude_inverse {
            reverts += 1;
        }
    }
    reverts
}

pub struct EditWarDetector {
    store: Store,
    hot_pages: Arc<HotPageTracker>,
    config: EditWarConfig,
    clock: SharedClock,
    cooldowns: Mutex<HashMap<String, std::time::Instant>>,
    analyzer: RwLock<Option<Arc<dyn ConflictAnalyzer>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for EditWarDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditWarDetector")
            .field("config", &self.config)
            .finish()
    }
}

impl EditWarDetector {
    /// Constructed without an analyzer: the server assembles this detector
    /// before the analysis service exists, then calls `set_analyzer` once
    /// both sides are built, avoiding a cyclic constructor dependency.
    pub fn new(
        store: Store,
        hot_pages: Arc<HotPageTracker>,
        config: EditWarConfig,
        clock: SharedClock,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hot_pages,
            config,
            clock,
            cooldowns: Mutex::new(HashMap::new()),
            analyzer: RwLock::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn set_analyzer(&self, analyzer: Arc<dyn ConflictAnalyzer>) {
        *self.analyzer.write() = Some(analyzer);
    }

    pub async fn observe(&self, edit: &EditEvent) -> Result<Option<EditWarAlert>> {
        let page = edit.title.as_str();

        if !self.hot_pages.is_hot(page).await? {
            return Ok(None);
        }

        self.store
            .hincrby(&Keys::editwar_editors(page), &edit.user, 1, self.config.window)
            .await?;
        self.store
            .lpush_trim(
                &Keys::editwar_changes(page),
                &edit.byte_change().to_string(),
                CHANGES_HISTORY_LEN,
                self.config.window,
            )
            .await?;

        let entry = TimelineEntry {
            user: edit.user.clone(),
            comment: edit.comment.clone(),
            byte_change: edit.byte_change(),
            timestamp: edit.timestamp,
            revision_id: edit.new_revision_id,
            server_url: edit.server_url.clone(),
        };
        let entry_json = serde_json::to_string(&entry)?;
        self.store
            .lpush_trim(
                &Keys::editwar_timeline(page),
                &entry_json,
                TIMELINE_HISTORY_LEN,
                TIMELINE_TTL,
            )
            .await?;

        let unique_editors = self.store.hlen(&Keys::editwar_editors(page)).await?;
        let total_edits = self.store.llen(&Keys::editwar_changes(page)).await?;

        if unique_editors < self.config.min_editors || total_edits < self.config.min_edits {
            return Ok(None);
        }

        let changes = self.read_changes(page).await?;
        let revert_count = count_reverts(&changes);
        if revert_count < self.config.min_reverts {
            return Ok(None);
        }

        if !self.check_cooldown_or_reanalyze(page).await {
            return Ok(None);
        }

        let timeline = read_timeline(&self.store, page).await?;
        let start_time = self.resolve_start_time(page, &timeline).await?;
        let severity = severity_for(unique_editors, revert_count);

        let alert = EditWarAlert {
            page: page.to_string(),
            editor_count: unique_editors,
            revert_count,
            severity,
            timestamp: self.clock.now_utc(),
            start_time,
            server_url: edit.server_url.clone(),
        };

        self.publish(&alert).await?;
        self.trigger_analysis(page).await;
        info!(page, revert_count, unique_editors, severity = %severity, "edit war alert emitted");
        Ok(Some(alert))
    }

    async fn read_changes(&self, page: &str) -> Result<Vec<i64>> {
        let raw = self.store.lrange_all(&Keys::editwar_changes(page)).await?;
        // stored newest-first via LPUSH; revert counting walks chronologically
        Ok(raw
            .iter()
            .rev()
            .filter_map(|s| s.parse().ok())
            .collect())
    }

    /// Minimum of the earliest timeline entry's own timestamp and any
    /// persisted `editwar:start` value, which is written only once
    /// (set-if-absent) and has its TTL refreshed on every publish.
    async fn resolve_start_time(
        &self,
        page: &str,
        timeline: &[TimelineEntry],
    ) -> Result<DateTime<Utc>> {
        let earliest_seen = timeline
            .first()
            .map(|e| DateTime::from_timestamp(e.timestamp, 0).unwrap_or_else(|| self.clock.now_utc()))
            .unwrap_or_else(|| self.clock.now_utc());

        let key = Keys::editwar_start(page);
        let ttl = TIMELINE_TTL;
        let created = self
            .store
            .set_nx(&key, &earliest_seen.to_rfc3339(), ttl)
            .await?;

        let persisted = if created {
            earliest_seen
        } else {
            self.store.expire(&key, ttl).await?;
            match self.store.get_string(&key).await? {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or(earliest_seen),
                None => earliest_seen,
            }
        };

        Ok(earliest_seen.min(persisted))
    }

    async fn publish(&self, alert: &EditWarAlert) -> Result<()> {
        let payload = serde_json::to_string(alert)?;
        self.store
            .xadd_bounded(
                Keys::alerts_editwars(),
                &[
                    ("data", payload),
                    ("severity", alert.severity.to_string()),
                    ("page", alert.page.clone()),
                ],
                1000,
            )
            .await?;
        let ttl = TIMELINE_TTL;
        self.store
            .set_string(&Keys::editwar_marker(&alert.page), "1", Some(ttl))
            .await?;
        self.store
            .set_string(&Keys::editwar_serverurl(&alert.page), &alert.server_url, Some(ttl))
            .await?;
        // timeline TTL is already 12h from `observe`'s lpush_trim; this keeps
        // it refreshed past the window's last write at alert time.
        self.store.expire(&Keys::editwar_timeline(&alert.page), ttl).await?;
        self.store.sadd(Keys::editwar_active_set(), &alert.page).await?;
        Ok(())
    }

    /// Returns `true` if a new alert may be published now. While a page is
    /// still in cooldown, bumps a reanalysis counter and triggers a
    /// background re-analysis every `ReanalyzeEvery`th observation instead
    /// of emitting a duplicate alert.
    async fn check_cooldown_or_reanalyze(&self, page: &str) -> bool {
        let now = self.clock.now_instant();
        let in_cooldown = {
            let mut cooldowns = self.cooldowns.lock();
            let active = cooldowns
                .get(page)
                .is_some_and(|started| now.duration_since(*started) < self.config.cooldown);

            if !active {
                cooldowns.insert(page.to_string(), now);
                if cooldowns.len() > MAX_COOLDOWN_ENTRIES {
                    let cutoff = self.config.cooldown;
                    cooldowns.retain(|_, started| now.duration_since(*started) < cutoff);
                    if cooldowns.len() > MAX_COOLDOWN_ENTRIES {
                        warn!("edit-war cooldown table still over cap after eviction pass");
                    }
                }
            }
            active
        };

        if !in_cooldown {
            return true;
        }

        if let Ok(ctr) = self
            .store
            .incr(&Keys::editwar_reanalyze_ctr(page), 1, self.config.window)
            .await
        {
            if ctr as u64 % self.config.reanalyze_every == 0 {
                let analyzer = self.analyzer.read().clone();
                let page = page.to_string();
                if let Some(analyzer) = analyzer {
                    tokio::spawn(async move { analyzer.reanalyze(&page).await });
                }
            }
        }
        false
    }

    async fn trigger_analysis(&self, page: &str) {
        let analyzer = self.analyzer.read().clone();
        if let Some(analyzer) = analyzer {
            let page = page.to_string();
            tokio::spawn(async move { analyzer.analyze(&page).await });
        }
    }

    /// Periodically sweeps the active set for pages whose edit-war marker
    /// has expired, triggering a final analysis summary and dropping them
    /// from the set.
    pub fn spawn_deactivation_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let detector = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(detector.config.deactivation_sweep_interval);
            loop {
                tokio::select! {
                    _ = detector.cancel.cancelled() => {
                        info!("edit-war deactivation sweep stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = detector.run_deactivation_pass().await {
                            warn!(error = %err, "edit-war deactivation sweep failed");
                        }
                    }
                }
            }
        })
    }

    async fn run_deactivation_pass(&self) -> Result<()> {
        let active = self.store.smembers(Keys::editwar_active_set()).await?;
        for page in active {
            let still_active = self.store.exists(&Keys::editwar_editors(&page)).await?;
            if still_active {
                continue;
            }
            self.store.srem(Keys::editwar_active_set(), &page).await?;
            debug!(page = %page, "edit war deactivated, removed from active set");
            let analyzer = self.analyzer.read().clone();
            if let Some(analyzer) = analyzer {
                analyzer.finalize(&page).await;
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
    fn counts_similar_magnitude_inverse_changes() {
        // 500 vs -480: min/max = 480/500 = 0.96 >= 0.6
        // -480 vs 510: min/max = 480/510 ~= 0.94 >= 0.6
        assert_eq!(count_reverts(&[500, -480, 510]), 2);
    }

    #[test]
    fn counts_trivial_oscillation() {
        assert_eq!(count_reverts(&[0, 0, 0]), 2);
    }

    #[test]
    fn counts_micro_reverts() {
        assert_eq!(count_reverts(&[5, -3]), 1);
    }

    #[test]
    fn same_sign_changes_are_not_reverts() {
        assert_eq!(count_reverts(&[500, 600, 700]), 0);
    }

    #[test]
    fn dissimilar_magnitude_opposite_sign_is_not_a_revert() {
        // min/max = 50/1000 = 0.05, well under 0.6
        assert_eq!(count_reverts(&[1000, -50]), 0);
    }

    #[test]
    fn severity_escalates_with_editors_and_reverts() {
        assert_eq!(severity_for(2, 2), Severity::Low);
        assert_eq!(severity_for(3, 1), Severity::Medium);
        assert_eq!(severity_for(4, 1), Severity::High);
        assert_eq!(severity_for(6, 1), Severity::Critical);
    }
}
