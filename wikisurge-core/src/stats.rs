//! Daily aggregate counters: total edits and per-language edit shares, read
//! back by the digest collector's language-share and total-edits sections.
//! Retained for at least 7 days so a weekly digest run can sum across the
//! whole window.

use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::Result;
use crate::model::EditEvent;
use crate::store::{Keys, Store};

/// Retention window for the daily hashes/counters, comfortably above the
/// spec's "retained >= 7 d" floor so a weekly digest run issued a little
/// late still finds the oldest day's bucket.
const RETENTION: Duration = Duration::from_secs(8 * 24 * 3600);

const TOTAL_FIELD: &str = "__total__";

/// Records the per-day statistics the digest collector sums over: a plain
/// edit counter and a language-count hash, both keyed by UTC date.
pub struct StatsRecorder {
    store: Store,
    clock: SharedClock,
}

impl std::fmt::Debug for StatsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRecorder").finish()
    }
}

impl StatsRecorder {
    pub fn new(store: Store, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Bump today's edit counter and language hash for one observed edit.
    pub async fn record(&self, edit: &EditEvent) -> Result<()> {
        let date = self.clock.now_utc().format("%Y-%m-%d").to_string();
        self.store.incr(&Keys::stats_edits(&date), 1, RETENTION).await?;
        let key = Keys::stats_languages(&date);
        self.store.hincrby(&key, edit.language(), 1, RETENTION).await?;
        self.store.hincrby(&key, TOTAL_FIELD, 1, RETENTION).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn edit(wiki: &str) -> EditEvent {
        EditEvent {
            title: "Rust".into(),
            user: "u".into(),
            wiki: wiki.into(),
            server_url: "https://en.wikipedia.org".into(),
            bot: false,
            timestamp: 0,
            old_length: 100,
            new_length: 120,
            old_revision_id: None,
            new_revision_id: None,
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn records_language_and_total() {
        let store = Store::fake();
        let clock = crate::clock::TestClock::new(Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap());
        let recorder = StatsRecorder::new(store.clone(), clock);

        recorder.record(&edit("enwiki")).await.unwrap();
        recorder.record(&edit("enwiki")).await.unwrap();
        recorder.record(&edit("jawiki")).await.unwrap();

        let langs = store.hgetall(&Keys::stats_languages("2026-07-28")).await.unwrap();
        assert_eq!(langs.get("en").unwrap(), "2");
        assert_eq!(langs.get("ja").unwrap(), "1");
        assert_eq!(langs.get(TOTAL_FIELD).unwrap(), "3");

        let edits = store.get_string(&Keys::stats_edits("2026-07-28")).await.unwrap();
        assert_eq!(edits.unwrap(), "3");
    }
}
