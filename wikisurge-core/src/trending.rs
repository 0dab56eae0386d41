//! Process-wide popularity ranking over exponential time decay.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::error::Result;
use crate::model::EditEvent;
use crate::store::{Keys, Store};

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct TrendingConfig {
    pub half_life: Duration,
    pub max_pages: usize,
    pub prune_interval: Duration,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            half_life: Duration::from_secs(30 * 60),
            max_pages: 5_000,
            prune_interval: Duration::from_secs(300),
        }
    }
}

/// Weight contributed by a single edit before decay is applied: new pages
/// and large byte changes count for more, bot edits for less.
pub fn edit_weight(edit: &EditEvent, is_new_page: bool) -> f64 {
    if is_new_page {
        2.0
    } else if edit.bot {
        0.5
    } else if edit.byte_change().unsigned_abs() >= 1000 {
        1.5
    } else {
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct TrendingEntry {
    pub page: String,
    pub score: f64,
}

pub struct TrendingScorer {
    store: Store,
    config: TrendingConfig,
    clock: SharedClock,
    cancel: CancellationToken,
}

impl std::fmt::Debug for TrendingScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendingScorer")
            .field("config", &self.config)
            .finish()
    }
}

impl TrendingScorer {
    pub fn new(store: Store, config: TrendingConfig, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            clock,
            cancel: CancellationToken::new(),
        })
    }

    /// Decay the stored score by the elapsed interval since its last
    /// update, add this edit's weight, and write back. Avoids keeping full
    /// edit history per page, as the scoring model allows.
    pub async fn record(&self, edit: &EditEvent, is_new_page: bool) -> Result<()> {
        let page = edit.title.as_str();
        let weight = edit_weight(edit, is_new_page);
        let now = self.clock.now_utc().timestamp() as f64;

        let old_score = self
            .store
            .zscore(Keys::trending_scores(), page)
            .await?
            .unwrap_or(0.0);
        let last_update: f64 = self
            .store
            .hgetall(Keys::trending_updated())
            .await?
            .get(page)
            .and_then(|v| v.parse().ok())
            .unwrap_or(now);

        let elapsed = (now - last_update).max(0.0);
        let half_life = self.config.half_life.as_secs_f64().max(1.0);
        let decayed = old_score * 2f64.powf(-elapsed / half_life);
        let new_score = decayed + weight;

        self.store.zadd(Keys::trending_scores(), page, new_score).await?;
        self.store
            .hset_many(
                Keys::trending_updated(),
                &[(page, now.to_string())],
                Duration::from_secs(7 * 24 * 3600),
            )
            .await?;
        Ok(())
    }

    pub async fn top(&self, n: usize) -> Result<Vec<TrendingEntry>> {
        let rows = self
            .store
            .zrevrange_withscores(Keys::trending_scores(), n as isize)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(page, score)| TrendingEntry { page, score })
            .collect())
    }

    /// Rank of a page in the global trending set, or 0 if not present. The
    /// wiki identifier is accepted for API symmetry with the rest of the
    /// detector surface; the trending set is not currently partitioned by
    /// wiki.
    pub async fn rank(&self, _wiki: &str, page: &str) -> Result<u64> {
        match self.store.zrank(Keys::trending_scores(), page).await? {
            Some(rank) => Ok(rank + 1),
            None => Ok(0),
        }
    }

    pub fn spawn_prune_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scorer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scorer.config.prune_interval);
            loop {
                tokio::select! {
                    _ = scorer.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = scorer.prune().await {
                            warn!(error = %err, "trending prune pass failed");
                        }
                    }
                }
            }
        })
    }

    async fn prune(&self) -> Result<()> {
        self.store
            .zremrangebyscore(Keys::trending_scores(), f64::MIN, EPSILON)
            .await?;
        self.store
            .zremrangebyrank_keep_top(Keys::trending_scores(), self.config.max_pages as isize)
            .await?;
        debug!("trending prune pass complete");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(byte_change: i64, bot: bool) -> EditEvent {
        EditEvent {
            title: "Test".into(),
            user: "u".into(),
            wiki: "enwiki".into(),
            server_url: "https://en.wikipedia.org".into(),
            bot,
            timestamp: 0,
            old_length: 1000,
            new_length: 1000 + byte_change,
            old_revision_id: None,
            new_revision_id: None,
            comment: String::new(),
        }
    }

    #[test]
    fn weight_prioritizes_new_pages() {
        assert_eq!(edit_weight(&edit(10, false), true), 2.0);
    }

    #[test]
    fn weight_discounts_bot_edits() {
        assert_eq!(edit_weight(&edit(10, true), false), 0.5);
    }

    #[test]
    fn weight_boosts_large_changes() {
        assert_eq!(edit_weight(&edit(1500, false), false), 1.5);
    }

    #[test]
    fn weight_default_is_one() {
        assert_eq!(edit_weight(&edit(10, false), false), 1.0);
    }
}
