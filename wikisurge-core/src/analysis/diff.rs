//! Wikipedia compare-API client and diff HTML -> plain text conversion.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, WikiSurgeError};

const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;
const MAX_DIFF_CHARS: usize = 2000;
const DEFAULT_SERVER_URL: &str = "https://en.wikipedia.org";
const MAX_REVISIONS: usize = 20;
const BATCH_SIZE: usize = 50;

#[derive(Deserialize)]
struct CompareResponse {
    query: Option<QueryEnvelope>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct QueryEnvelope {
    pages: HashMap<String, PageEntry>,
}

#[derive(Deserialize)]
struct PageEntry {
    #[serde(default)]
    revisions: Vec<RevisionEntry>,
}

#[derive(Deserialize)]
struct RevisionEntry {
    revid: u64,
    #[serde(default)]
    diff: Option<DiffBody>,
}

#[derive(Deserialize)]
struct DiffBody {
    #[serde(rename = "*", default)]
    html: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

pub struct DiffFetcher {
    client: reqwest::Client,
}

impl std::fmt::Debug for DiffFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffFetcher").finish()
    }
}

impl DiffFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("WikiSurge/0.1 (anomaly-detection; conflict-analysis-bot)")
            .build()
            .map_err(WikiSurgeError::from)?;
        Ok(Self { client })
    }

    /// Fetch plain-text diffs for up to the 20 most recent revision ids,
    /// batching requests in groups of 50 pipe-separated ids against the
    /// origin wiki's compare API. Missing or failed individual diffs are
    /// simply absent from the returned map; the caller degrades gracefully.
    /// Cooperative with `cancel`: a batch still in flight when the token
    /// fires is abandoned rather than awaited to completion.
    pub async fn fetch_diffs(
        &self,
        server_url: Option<&str>,
        revision_ids: &[u64],
        cancel: &CancellationToken,
    ) -> HashMap<u64, String> {
        let server_url = server_url.unwrap_or(DEFAULT_SERVER_URL);
        let mut ids: Vec<u64> = revision_ids.to_vec();
        // caller already orders most-recent first; cap after that ordering
        ids.truncate(MAX_REVISIONS);

        let mut out = HashMap::new();
        for batch in ids.chunks(BATCH_SIZE) {
            if cancel.is_cancelled() {
                break;
            }
            let fetch = self.fetch_batch(server_url, batch);
            tokio::select! {
                result = fetch => match result {
                    Ok(diffs) => out.extend(diffs),
                    Err(err) => warn!(error = %err, server_url, "diff batch fetch failed"),
                },
                _ = cancel.cancelled() => {
                    warn!(server_url, "diff fetch cancelled mid-batch");
                    break;
                }
            }
        }
        out
    }

    async fn fetch_batch(&self, server_url: &str, ids: &[u64]) -> Result<HashMap<u64, String>> {
        url::Url::parse(server_url)
            .map_err(|e| WikiSurgeError::Downstream(format!("invalid wiki server url {server_url}: {e}")))?;

        let revids = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let url = format!(
            "{}/w/api.php?action=query&prop=revisions&revids={}&rvprop=ids&rvdiffto=prev&format=json",
            server_url.trim_end_matches('/'),
            revids
        );

        let response = self.client.get(&url).send().await?;
        let body = read_capped(response).await?;
        let parsed: CompareResponse = serde_json::from_slice(&body)?;

        if let Some(error) = parsed.error {
            return Err(WikiSurgeError::Downstream(format!(
                "compare api error {}: {}",
                error.code, error.info
            )));
        }

        let mut out = HashMap::new();
        if let Some(query) = parsed.query {
            for page in query.pages.into_values() {
                for revision in page.revisions {
                    if let Some(diff) = revision.diff {
                        out.insert(revision.revid, diff_html_to_text(&diff.html));
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Read a response body, aborting once it exceeds `MAX_RESPONSE_BYTES`
/// rather than buffering an unbounded payload into memory.
async fn read_capped(response: reqwest::Response) -> Result<Vec<u8>> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(WikiSurgeError::Downstream(
                "compare api response exceeded 2 MiB cap".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn added_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<td class="diff-addedline"[^>]*>(.*?)</td>"#).unwrap()
    })
}

fn deleted_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<td class="diff-deletedline"[^>]*>(.*?)</td>"#).unwrap()
    })
}

fn inline_change_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<(ins|del)[^>]*>(.*?)</(ins|del)>"#).unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Extract added/deleted table cells from a MediaWiki diff HTML payload,
/// wrap inline `ins`/`del` runs in guillemets, strip remaining tags, and
/// collapse whitespace. Truncated at 2000 characters with an ellipsis.
pub fn diff_html_to_text(html: &str) -> String {
    let mut lines = Vec::new();

    for cap in added_line_re().captures_iter(html) {
        lines.push(format!("+ {}", clean_cell(&cap[1])));
    }
    for cap in deleted_line_re().captures_iter(html) {
        lines.push(format!("- {}", clean_cell(&cap[1])));
    }

    let joined = lines.join("\n");
    let collapsed = whitespace_re().replace_all(joined.trim(), " ").to_string();

    if collapsed.chars().count() > MAX_DIFF_CHARS {
        let truncated: String = collapsed.chars().take(MAX_DIFF_CHARS).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}

fn clean_cell(cell: &str) -> String {
    let wrapped = inline_change_re().replace_all(cell, "«$2»");
    let stripped = tag_re().replace_all(&wrapped, "");
    html_escape::decode(&stripped)
}

/// Minimal HTML entity decoding for the handful of entities MediaWiki diff
/// markup actually emits; a full decoder is unwarranted for this path.
mod html_escape {
    pub fn decode(input: &str) -> String {
        input
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&nbsp;", " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_inline_changes_in_guillemets() {
        let html = r#"<td class="diff-addedline">prefix <ins class="diffchange">new text</ins> suffix</td>"#;
        let text = diff_html_to_text(html);
        assert_eq!(text, "+ prefix «new text» suffix");
    }

    #[test]
    fn combines_added_and_deleted_lines() {
        let html = concat!(
            r#"<td class="diff-deletedline">old <del>bad</del></td>"#,
            r#"<td class="diff-addedline">new <ins>good</ins></td>"#,
        );
        let text = diff_html_to_text(html);
        assert!(text.contains("- old «bad»"));
        assert!(text.contains("+ new «good»"));
    }

    #[test]
    fn truncates_long_diffs() {
        let long_cell = "x".repeat(3000);
        let html = format!(r#"<td class="diff-addedline">{long_cell}</td>"#);
        let text = diff_html_to_text(&html);
        assert!(text.ends_with("..."));
        assert!(text.chars().count() <= MAX_DIFF_CHARS + 3);
    }

    #[tokio::test]
    async fn rejects_a_malformed_wiki_server_url() {
        let fetcher = DiffFetcher::new().unwrap();
        let err = fetcher.fetch_batch("not a url", &[1, 2]).await.unwrap_err();
        assert!(matches!(err, WikiSurgeError::Downstream(_)));
    }
}
