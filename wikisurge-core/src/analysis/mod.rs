//! Conflict analysis service: on edit-war escalation, fetches the
//! contested diffs and asks an LLM (with a heuristic fallback) to
//! characterize the dispute.

pub mod diff;
pub mod heuristic;
pub mod llm;
pub mod model;
mod prompt;
mod service;

pub use llm::{LlmClient, LlmConfig, LlmProvider};
pub use model::{role, AnalysisRecord, AnalysisSeverity, Side, SideEditor};
pub use service::AnalysisService;

use async_trait::async_trait;

/// Abstraction the edit-war detector depends on so it can trigger analysis
/// without owning the HTTP/LLM machinery itself. `EditWarDetector` is built
/// with no analyzer and gains one via `set_analyzer` once the server wires
/// the two together, breaking what would otherwise be a cyclic dependency
/// between the detector and the service that consumes its alerts.
#[async_trait]
pub trait ConflictAnalyzer: Send + Sync {
    /// Kick off analysis for a page that just crossed the edit-war
    /// threshold. Best-effort: failures are logged, not surfaced, since the
    /// alert has already been published without the analysis result.
    async fn analyze(&self, page: &str);

    /// Re-run analysis for a page still under cooldown, invoked every
    /// `ReanalyzeEvery`th observation so long-running conflicts get updated
    /// summaries instead of a single stale one.
    async fn reanalyze(&self, page: &str);

    /// Produce a final summary once a page's edit-war markers have expired
    /// and it is about to leave the active set.
    async fn finalize(&self, page: &str);
}
