//! System/user prompt construction for the LLM analysis path.

use std::collections::HashMap;

use crate::model::TimelineEntry;

pub const SYSTEM_PROMPT: &str = r#"You are an editorial dispute analyst for Wikipedia edit histories.
Given a timeline of edits to a single page, identify the dispute's sides and severity.
Respond with ONLY a JSON object matching this schema, no other text:
{
  "summary": string,
  "sides": [{"position": string, "editors": [{"user": string, "edit_count": number, "role": string}]}],
  "content_area": string,
  "severity": "low"|"moderate"|"high"|"critical",
  "recommendation": string
}"#;

/// Build the user prompt: one numbered line per timeline entry, each
/// followed by an indented diff when one was fetched for that revision.
pub fn build_user_prompt(timeline: &[TimelineEntry], diffs: &HashMap<u64, String>) -> String {
    let mut out = String::new();
    for (i, entry) in timeline.iter().enumerate() {
        let time = chrono::DateTime::from_timestamp(entry.timestamp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        out.push_str(&format!(
            "{}. [{}] user \"{}\" ({:+} bytes): {}\n",
            i + 1,
            time,
            entry.user,
            entry.byte_change,
            entry.comment
        ));
        if let Some(revid) = entry.revision_id {
            if let Some(diff) = diffs.get(&revid) {
                out.push_str("    ");
                out.push_str(diff);
                out.push('\n');
            }
        }
    }
    if diffs.is_empty() {
        out.push_str("\n(diffs unavailable)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_entries_and_notes_missing_diffs() {
        let timeline = vec![TimelineEntry {
            user: "alice".into(),
            comment: "added section".into(),
            byte_change: 120,
            timestamp: 1_700_000_000,
            revision_id: Some(1),
            server_url: "https://en.wikipedia.org".into(),
        }];
        let prompt = build_user_prompt(&timeline, &HashMap::new());
        assert!(prompt.starts_with("1. ["));
        assert!(prompt.contains("diffs unavailable"));
    }
}
