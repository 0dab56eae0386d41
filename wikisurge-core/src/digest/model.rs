use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    Daily,
    Weekly,
    Both,
    None,
}

impl DigestFrequency {
    pub fn includes(&self, period: DigestPeriod) -> bool {
        matches!(
            (self, period),
            (DigestFrequency::Daily, DigestPeriod::Daily)
                | (DigestFrequency::Weekly, DigestPeriod::Weekly)
                | (DigestFrequency::Both, _)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestContent {
    Global,
    Watchlist,
    All,
}

impl DigestContent {
    pub fn wants_global(&self) -> bool {
        matches!(self, DigestContent::Global | DigestContent::All)
    }

    pub fn wants_watchlist(&self) -> bool {
        matches!(self, DigestContent::Watchlist | DigestContent::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPeriod {
    Daily,
    Weekly,
}

impl DigestPeriod {
    pub fn duration(&self) -> chrono::Duration {
        match self {
            DigestPeriod::Daily => chrono::Duration::hours(24),
            DigestPeriod::Weekly => chrono::Duration::days(7),
        }
    }

    pub fn min_interval(&self) -> chrono::Duration {
        match self {
            DigestPeriod::Daily => chrono::Duration::hours(23),
            DigestPeriod::Weekly => chrono::Duration::days(6),
        }
    }
}

/// A read-only view of a user record, as the digest scheduler needs it.
/// The authoritative record lives in the external user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub verified: bool,
    pub frequency: DigestFrequency,
    pub content: DigestContent,
    pub spike_threshold: f64,
    pub watchlist: Vec<String>,
    pub unsubscribe_token: String,
    pub last_digest_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    EditWar,
    Trending,
}

#[derive(Debug, Clone)]
pub struct Highlight {
    pub title: String,
    pub kind: HighlightKind,
    pub edit_count: u64,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct LanguageShare {
    pub language: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone)]
pub struct WatchlistEvent {
    pub title: String,
    pub notable: bool,
    pub edit_count: u64,
    pub spike_ratio: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct DigestData {
    pub period: DigestPeriod,
    pub period_start: DateTime<Utc>,
    pub highlights: Vec<Highlight>,
    pub language_shares: Vec<LanguageShare>,
    pub total_edits: u64,
    pub edit_war_count: u64,
    pub watchlist_events: Vec<WatchlistEvent>,
}
