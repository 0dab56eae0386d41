use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};

use crate::clock::SharedClock;
use crate::digest::model::{
    DigestData, DigestPeriod, Highlight, HighlightKind, LanguageShare, UserRecord, WatchlistEvent,
};
use crate::error::Result;
use crate::model::EditWarAlert;
use crate::store::{Keys, Store};

const MAX_HIGHLIGHTS: usize = 5;
const MAX_LANGUAGES: usize = 5;
const MAX_TRENDING_CANDIDATES: isize = 100;
const MAX_TRENDING_HIGHLIGHTS: usize = 20;
const NOTABLE_HOURLY_EDITS: u64 = 10;

#[derive(Clone)]
pub struct Collector {
    store: Store,
    clock: SharedClock,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector").finish()
    }
}

impl Collector {
    pub fn new(store: Store, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn collect_global(&self, period: DigestPeriod) -> Result<DigestData> {
        let now = self.clock.now_utc();
        let period_start = now - period.duration();

        let war_highlights = self.collect_war_highlights(period_start).await?;
        let trending_highlights = self.collect_trending_highlights(period_start).await?;

        let mut highlights = war_highlights;
        highlights.extend(trending_highlights);
        rank_and_cap_highlights(&mut highlights);

        let (language_shares, total_edits) = self.collect_language_shares(now, period_start).await?;
        let edit_war_count = self.store.xlen(Keys::alerts_editwars()).await?;

        Ok(DigestData {
            period,
            period_start,
            highlights,
            language_shares,
            total_edits,
            edit_war_count,
            watchlist_events: Vec::new(),
        })
    }

    async fn collect_war_highlights(&self, period_start: DateTime<Utc>) -> Result<Vec<Highlight>> {
        let entries = self
            .store
            .xrange_since(Keys::alerts_editwars(), period_start.timestamp_millis())
            .await?;

        let mut seen = HashSet::new();
        let mut highlights = Vec::new();
        for entry in entries {
            let Some(raw) = entry.get("data") else { continue };
            let Ok(alert) = serde_json::from_str::<EditWarAlert>(raw) else { continue };
            if !seen.insert(alert.page.clone()) {
                continue;
            }
            highlights.push(Highlight {
                title: alert.page,
                kind: HighlightKind::EditWar,
                edit_count: alert.revert_count,
                severity: Some(alert.severity),
            });
        }
        Ok(highlights)
    }

    async fn collect_trending_highlights(&self, period_start: DateTime<Utc>) -> Result<Vec<Highlight>> {
        let candidates = self
            .store
            .zrevrange_withscores(Keys::trending_scores(), MAX_TRENDING_CANDIDATES)
            .await?;
        let updated = self.store.hgetall(Keys::trending_updated()).await?;
        let cutoff = period_start.timestamp() as f64;

        let mut highlights = Vec::new();
        for (page, _score) in candidates {
            let last_update: f64 = updated.get(&page).and_then(|v| v.parse().ok()).unwrap_or(0.0);
            if last_update < cutoff {
                continue;
            }
            let stats = self.store.hgetall(&Keys::hot_stats(&page)).await?;
            let edit_count = stats.get("edits_1h").and_then(|v| v.parse().ok()).unwrap_or(0);
            highlights.push(Highlight {
                title: page,
                kind: HighlightKind::Trending,
                edit_count,
                severity: None,
            });
            if highlights.len() >= MAX_TRENDING_HIGHLIGHTS {
                break;
            }
        }
        Ok(highlights)
    }

    async fn collect_language_shares(
        &self,
        now: DateTime<Utc>,
        period_start: DateTime<Utc>,
    ) -> Result<(Vec<LanguageShare>, u64)> {
        let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut total: u64 = 0;

        for date in dates_in_window(period_start, now) {
            let hash = self.store.hgetall(&Keys::stats_languages(&date)).await?;
            for (lang, value) in hash {
                let Ok(count) = value.parse::<u64>() else { continue };
                if lang == "__total__" {
                    total += count;
                } else {
                    *counts.entry(lang).or_insert(0) += count;
                }
            }
        }

        let mut shares: Vec<LanguageShare> = counts
            .into_iter()
            .map(|(language, count)| {
                let percentage = if total > 0 {
                    ((count as f64 / total as f64) * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                LanguageShare { language, count, percentage }
            })
            .collect();
        shares.sort_by(|a, b| b.count.cmp(&a.count));
        shares.truncate(MAX_LANGUAGES);

        Ok((shares, total))
    }

    /// Build a per-user view: for each watchlisted title, copy the global
    /// highlight if present, else check hot-page stats, else emit a
    /// no-activity placeholder. Notable events (from hot-page stats) sort
    /// first, then by edit count descending.
    pub async fn personalize_for_user(&self, global: &DigestData, user: &UserRecord) -> Result<DigestData> {
        let mut events = Vec::with_capacity(user.watchlist.len());

        for title in &user.watchlist {
            if let Some(highlight) = global.highlights.iter().find(|h| &h.title == title) {
                events.push(WatchlistEvent {
                    title: title.clone(),
                    notable: true,
                    edit_count: highlight.edit_count,
                    spike_ratio: None,
                    note: format!("Featured in this period's global highlights ({} edits)", highlight.edit_count),
                });
                continue;
            }

            let stats = self.store.hgetall(&Keys::hot_stats(title)).await?;
            if !stats.is_empty() {
                let edits_1h: u64 = stats.get("edits_1h").and_then(|v| v.parse().ok()).unwrap_or(0);
                let edits_5min: u64 = stats.get("edits_5min").and_then(|v| v.parse().ok()).unwrap_or(0);
                let baseline = (edits_1h as f64 / 60.0).max(0.1);
                let spike_ratio = (edits_5min as f64 / 5.0) / baseline;
                let notable = edits_1h > NOTABLE_HOURLY_EDITS;
                events.push(WatchlistEvent {
                    title: title.clone(),
                    notable,
                    edit_count: edits_1h,
                    spike_ratio: Some(spike_ratio),
                    note: format!("{edits_1h} edits in the last hour"),
                });
                continue;
            }

            events.push(WatchlistEvent {
                title: title.clone(),
                notable: false,
                edit_count: 0,
                spike_ratio: None,
                note: "no recent activity".to_string(),
            });
        }

        events.sort_by(|a, b| b.notable.cmp(&a.notable).then(b.edit_count.cmp(&a.edit_count)));

        Ok(DigestData { watchlist_events: events, ..global.clone() })
    }

    pub fn should_send_to_user(&self, data: &DigestData, user: &UserRecord) -> bool {
        let global_worthy = user.content.wants_global() && !data.highlights.is_empty();
        let watchlist_worthy = user.content.wants_watchlist()
            && data
                .watchlist_events
                .iter()
                .any(|e| e.notable && e.spike_ratio.is_some_and(|r| r >= user.spike_threshold));
        global_worthy || watchlist_worthy
    }
}

fn rank_and_cap_highlights(highlights: &mut Vec<Highlight>) {
    highlights.sort_by(|a, b| {
        let kind_rank = |h: &Highlight| match h.kind {
            HighlightKind::EditWar => 0,
            HighlightKind::Trending => 1,
        };
        kind_rank(a).cmp(&kind_rank(b)).then(b.edit_count.cmp(&a.edit_count))
    });
    highlights.truncate(MAX_HIGHLIGHTS);
}

fn dates_in_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let mut dates = Vec::new();
    let mut cursor: NaiveDate = start.date_naive();
    let last = end.date_naive();
    while cursor <= last {
        dates.push(cursor.format("%Y-%m-%d").to_string());
        cursor += ChronoDuration::days(1);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::model::{DigestContent, DigestFrequency};

    fn user(content: DigestContent, watchlist: Vec<&str>) -> UserRecord {
        UserRecord {
            id: "u1".into(),
            email: "u1@example.com".into(),
            verified: true,
            frequency: DigestFrequency::Daily,
            content,
            spike_threshold: 5.0,
            watchlist: watchlist.into_iter().map(String::from).collect(),
            unsubscribe_token: "tok".into(),
            last_digest_at: None,
        }
    }

    #[test]
    fn global_content_preference_matches_scenario_users() {
        let data = DigestData {
            period: DigestPeriod::Daily,
            period_start: Utc::now(),
            highlights: vec![Highlight {
                title: "OpenAI".into(),
                kind: HighlightKind::EditWar,
                edit_count: 3,
                severity: None,
            }],
            language_shares: vec![],
            total_edits: 163_000,
            edit_war_count: 1,
            watchlist_events: vec![],
        };
        let a = user(DigestContent::All, vec!["Bitcoin", "Ethereum"]);
        let b = user(DigestContent::Global, vec![]);
        let c = user(DigestContent::Watchlist, vec![]);

        assert!(!data.highlights.is_empty() && a.content.wants_global());
        assert!(!data.highlights.is_empty() && b.content.wants_global());
        assert!(!c.content.wants_global());
    }

    #[test]
    fn ranks_edit_wars_before_trending_by_edit_count() {
        let mut highlights = vec![
            Highlight { title: "Trend1".into(), kind: HighlightKind::Trending, edit_count: 50, severity: None },
            Highlight { title: "War1".into(), kind: HighlightKind::EditWar, edit_count: 2, severity: None },
        ];
        rank_and_cap_highlights(&mut highlights);
        assert_eq!(highlights[0].title, "War1");
    }
}
