use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::analysis::diff::DiffFetcher;
use crate::analysis::heuristic::analyze_heuristically;
use crate::analysis::llm::{extract_json_object, warn_llm_failure, LlmClient};
use crate::analysis::model::{AnalysisRecord, AnalysisSeverity, Side};
use crate::analysis::prompt::{build_user_prompt, SYSTEM_PROMPT};
use crate::analysis::ConflictAnalyzer;
use crate::clock::SharedClock;
use crate::error::{Result, WikiSurgeError};
use crate::metrics;
use crate::model::TimelineEntry;
use crate::store::{Keys, Store};
use crate::timeline::read_timeline;

const ANALYSIS_CACHE_TTL: Duration = Duration::from_secs(4 * 3600);
const FINAL_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const AUTO_ANALYSIS_DEADLINE: Duration = Duration::from_secs(30);
const FINAL_ANALYSIS_DEADLINE: Duration = Duration::from_secs(45);
const MAX_DIFF_REVISIONS: usize = 20;

#[derive(Deserialize)]
struct LlmSchema {
    summary: String,
    #[serde(default)]
    sides: Vec<Side>,
    #[serde(default = "default_content_area")]
    content_area: String,
    severity: AnalysisSeverity,
    #[serde(default)]
    recommendation: String,
}

fn default_content_area() -> String {
    "unknown".to_string()
}

pub struct AnalysisService {
    store: Store,
    llm: Option<LlmClient>,
    clock: SharedClock,
    diff_fetcher: DiffFetcher,
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("llm_configured", &self.llm.is_some())
            .finish()
    }
}

impl AnalysisService {
    pub fn new(store: Store, llm: Option<LlmClient>, clock: SharedClock) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            store,
            llm,
            clock,
            diff_fetcher: DiffFetcher::new()?,
        }))
    }

    async fn analyze_cached(&self, page: &str, cancel: &CancellationToken) -> Result<AnalysisRecord> {
        let cache_key = Keys::editwar_analysis(page);
        if let Some(mut cached) = self.store.get_json::<AnalysisRecord>(&cache_key).await? {
            cached.cache_hit = true;
            metrics::registry().record_analysis_cache_hit();
            return Ok(cached);
        }
        metrics::registry().record_analysis_cache_miss();
        let record = self.compute(page, cancel).await?;
        self.store
            .set_json(&cache_key, &record, Some(ANALYSIS_CACHE_TTL))
            .await?;
        Ok(record)
    }

    async fn compute(&self, page: &str, cancel: &CancellationToken) -> Result<AnalysisRecord> {
        let timeline = read_timeline(&self.store, page).await?;
        if timeline.is_empty() {
            return Ok(AnalysisRecord::placeholder(page, self.clock.now_utc()));
        }

        if let Some(llm) = &self.llm {
            if llm.config().enabled() {
                match self.try_llm(page, &timeline, llm, cancel).await {
                    Ok(record) => return Ok(record),
                    Err(err) => warn_llm_failure(&err),
                }
            }
        }

        Ok(analyze_heuristically(page, &timeline, &self.clock))
    }

    async fn try_llm(
        &self,
        page: &str,
        timeline: &[TimelineEntry],
        llm: &LlmClient,
        cancel: &CancellationToken,
    ) -> Result<AnalysisRecord> {
        let server_url = match timeline.iter().rev().find(|e| !e.server_url.is_empty()) {
            Some(entry) => Some(entry.server_url.clone()),
            None => self.store.get_string(&Keys::editwar_serverurl(page)).await?,
        };

        let mut revision_ids: Vec<u64> = timeline
            .iter()
            .rev()
            .filter_map(|e| e.revision_id)
            .collect();
        revision_ids.truncate(MAX_DIFF_REVISIONS);

        let diffs = self
            .diff_fetcher
            .fetch_diffs(server_url.as_deref(), &revision_ids, cancel)
            .await;

        let user_prompt = build_user_prompt(timeline, &diffs);
        let raw = llm.complete(SYSTEM_PROMPT, &user_prompt, cancel).await?;

        if raw.trim().is_empty() {
            return Err(WikiSurgeError::Downstream("empty llm response".to_string()));
        }

        let edit_count = timeline.len() as u64;
        let generated_at = self.clock.now_utc();

        let record = match extract_json_object(&raw).and_then(|s| serde_json::from_str::<LlmSchema>(s).ok()) {
            Some(schema) => AnalysisRecord {
                page_title: page.to_string(),
                summary: schema.summary,
                sides: schema.sides,
                content_area: schema.content_area,
                severity: schema.severity,
                recommendation: schema.recommendation,
                edit_count,
                generated_at,
                cache_hit: false,
            },
            None => AnalysisRecord {
                page_title: page.to_string(),
                summary: raw,
                sides: Vec::new(),
                content_area: default_content_area(),
                severity: AnalysisSeverity::Unknown,
                recommendation: String::new(),
                edit_count,
                generated_at,
                cache_hit: false,
            },
        };

        Ok(record)
    }
}

#[async_trait]
impl ConflictAnalyzer for AnalysisService {
    async fn analyze(&self, page: &str) {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(AUTO_ANALYSIS_DEADLINE, self.analyze_cached(page, &cancel)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!(page, error = %err, "analysis failed"),
            Err(_) => {
                cancel.cancel();
                warn!(page, "auto-analysis deadline exceeded");
            }
        }
    }

    async fn reanalyze(&self, page: &str) {
        let _ = self.store.delete(&Keys::editwar_analysis(page)).await;
        self.analyze(page).await;
    }

    async fn finalize(&self, page: &str) {
        let _ = self.store.delete(&Keys::editwar_analysis(page)).await;
        let cancel = CancellationToken::new();
        match tokio::time::timeout(FINAL_ANALYSIS_DEADLINE, self.compute(page, &cancel)).await {
            Ok(Ok(record)) => {
                if let Err(err) = self
                    .store
                    .set_json(&Keys::editwar_analysis(page), &record, Some(FINAL_CACHE_TTL))
                    .await
                {
                    warn!(page, error = %err, "failed to cache final analysis");
                }
            }
            Ok(Err(err)) => warn!(page, error = %err, "final analysis failed"),
            Err(_) => {
                cancel.cancel();
                warn!(page, "final analysis deadline exceeded");
            }
        }
    }
}
