//! Key-schema helpers for the shared keyspace. Centralizing the `format!`
//! calls here keeps every component honest about the namespacing in the
//! data model and makes the schema greppable from one place, the same role
//! `CacheKeys` plays for the media query cache this crate is descended
//! from.

pub struct Keys;

impl Keys {
    pub fn hot_activity(page: &str) -> String {
        format!("hot:activity:{page}")
    }

    pub fn hot_editors(page: &str) -> String {
        format!("hot:editors:{page}")
    }

    pub fn hot_stats(page: &str) -> String {
        format!("hot:stats:{page}")
    }

    pub fn hot_marker(page: &str) -> String {
        format!("hot:marker:{page}")
    }

    /// Auxiliary set of currently-hot pages, maintained alongside the
    /// per-page marker so the tracker can enforce `MaxTracked` without an
    /// `O(n)` key scan on every promotion decision.
    pub fn hot_tracked_set() -> &'static str {
        "hot:tracked_set"
    }

    /// Auxiliary sorted set of edit timestamps backing the 5-min/1-h
    /// counters. Not named directly in the public key schema but required
    /// to compute `hot:stats` without retaining full edit history.
    pub fn hot_timestamps(page: &str) -> String {
        format!("hot:ts:{page}")
    }

    pub fn editwar_editors(page: &str) -> String {
        format!("editwar:editors:{page}")
    }

    pub fn editwar_changes(page: &str) -> String {
        format!("editwar:changes:{page}")
    }

    pub fn editwar_timeline(page: &str) -> String {
        format!("editwar:timeline:{page}")
    }

    pub fn editwar_marker(page: &str) -> String {
        format!("editwar:marker:{page}")
    }

    pub fn editwar_start(page: &str) -> String {
        format!("editwar:start:{page}")
    }

    pub fn editwar_serverurl(page: &str) -> String {
        format!("editwar:serverurl:{page}")
    }

    pub fn editwar_reanalyze_ctr(page: &str) -> String {
        format!("editwar:reanalyze_ctr:{page}")
    }

    pub fn editwar_active_set() -> &'static str {
        "editwar:active_set"
    }

    pub fn editwar_editors_pattern() -> &'static str {
        "editwar:editors:*"
    }

    pub fn trending_scores() -> &'static str {
        "trending:scores"
    }

    pub fn trending_updated() -> &'static str {
        "trending:updated"
    }

    pub fn alerts_spikes() -> &'static str {
        "alerts:spikes"
    }

    pub fn alerts_editwars() -> &'static str {
        "alerts:editwars"
    }

    pub fn editwar_analysis(page: &str) -> String {
        format!("editwar:analysis:{page}")
    }

    pub fn spike_marker(page: &str) -> String {
        format!("spike:{page}")
    }

    pub fn stats_languages(date: &str) -> String {
        format!("stats:languages:{date}")
    }

    pub fn stats_edits(date: &str) -> String {
        format!("stats:edits:{date}")
    }
}
