use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity scale for analysis output. Distinct from `crate::model::Severity`
/// (which orders spike/edit-war alerts): this one includes `Unknown`, the
/// value used when even the heuristic path can't classify a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSeverity {
    Low,
    Moderate,
    High,
    Critical,
    Unknown,
}

/// The canonical roles the heuristic path assigns, offered as constants
/// rather than a closed enum: `role` is specified as a free-form string so
/// an LLM-produced analysis isn't constrained to this vocabulary.
pub mod role {
    pub const REVERTER: &str = "reverter";
    pub const CONTENT_ADDER: &str = "content adder";
    pub const CONTENT_REMOVER: &str = "content remover";
    pub const CONTRIBUTOR: &str = "contributor";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEditor {
    pub user: String,
    pub edit_count: u64,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Side {
    pub position: String,
    pub editors: Vec<SideEditor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub page_title: String,
    pub summary: String,
    pub sides: Vec<Side>,
    pub content_area: String,
    pub severity: AnalysisSeverity,
    pub recommendation: String,
    pub edit_count: u64,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub cache_hit: bool,
}

impl AnalysisRecord {
    /// Emitted when a timeline is missing or unparseable: zero edits, no
    /// sides, severity unknown.
    pub fn placeholder(page_title: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            page_title: page_title.to_string(),
            summary: "No timeline data available for this page.".to_string(),
            sides: Vec::new(),
            content_area: "unknown".to_string(),
            severity: AnalysisSeverity::Unknown,
            recommendation: "Insufficient data to recommend an action.".to_string(),
            edit_count: 0,
            generated_at,
            cache_hit: false,
        }
    }
}
