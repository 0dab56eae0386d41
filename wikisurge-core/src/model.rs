use serde::{Deserialize, Serialize};

/// A single Wikipedia edit event as delivered by the upstream edit source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditEvent {
    pub title: String,
    pub user: String,
    pub wiki: String,
    pub server_url: String,
    pub bot: bool,
    pub timestamp: i64,
    pub old_length: i64,
    pub new_length: i64,
    pub old_revision_id: Option<u64>,
    pub new_revision_id: Option<u64>,
    pub comment: String,
}

impl EditEvent {
    pub fn byte_change(&self) -> i64 {
        self.new_length - self.old_length
    }

    /// The `wiki` field with the trailing "wiki" suffix stripped, e.g.
    /// `enwiki` -> `en`.
    pub fn language(&self) -> &str {
        self.wiki.strip_suffix("wiki").unwrap_or(&self.wiki)
    }
}

/// Severity ordinal shared by both alert kinds and the analysis output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// The closed sum of alert kinds. Represented as a tagged record with a
/// shared envelope rather than two unrelated structs, since every consumer
/// of the alert streams needs to branch on severity/timestamp/page
/// uniformly regardless of kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Spike(SpikeAlert),
    EditWar(EditWarAlert),
}

impl Alert {
    pub fn page(&self) -> &str {
        match self {
            Alert::Spike(a) => &a.page,
            Alert::EditWar(a) => &a.page,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Alert::Spike(a) => a.severity,
            Alert::EditWar(a) => a.severity,
        }
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            Alert::Spike(a) => a.timestamp,
            Alert::EditWar(a) => a.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeAlert {
    pub page: String,
    pub ratio: f64,
    pub edits_5min: u64,
    pub edits_1h: u64,
    pub severity: Severity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub unique_editors: u64,
    pub server_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditWarAlert {
    pub page: String,
    pub editor_count: u64,
    pub revert_count: u64,
    pub severity: Severity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub server_url: String,
}

/// A single entry in a page's edit-war timeline, used both for revert
/// counting and as the raw material for conflict analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub user: String,
    pub comment: String,
    pub byte_change: i64,
    pub timestamp: i64,
    pub revision_id: Option<u64>,
    pub server_url: String,
}

/// Per-page short-window statistics surfaced by the hot-page tracker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageStats {
    pub edits_5min: u64,
    pub edits_1h: u64,
    pub editors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EditEvent {
        EditEvent {
            title: "Rust (programming language)".into(),
            user: "Alice".into(),
            wiki: "enwiki".into(),
            server_url: "https://en.wikipedia.org".into(),
            bot: false,
            timestamp: 1_700_000_000,
            old_length: 1000,
            new_length: 1200,
            old_revision_id: Some(1),
            new_revision_id: Some(2),
            comment: "added section".into(),
        }
    }

    #[test]
    fn byte_change_is_new_minus_old() {
        assert_eq!(sample().byte_change(), 200);
    }

    #[test]
    fn language_strips_wiki_suffix() {
        assert_eq!(sample().language(), "en");
        let mut e = sample();
        e.wiki = "jawiki".into();
        assert_eq!(e.language(), "ja");
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }
}
