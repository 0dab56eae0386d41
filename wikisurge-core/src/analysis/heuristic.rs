//! Deterministic fallback analysis, used when no LLM is configured or the
//! LLM path fails. No network calls; derives everything from the timeline.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::analysis::model::{role, AnalysisRecord, AnalysisSeverity, Side, SideEditor};
use crate::clock::SharedClock;
use crate::editwar::count_reverts;
use crate::model::TimelineEntry;

const REVERT_TOKENS: [&str; 4] = ["revert", "undid", "undo", "rv "];

struct EditorStats {
    edit_count: u64,
    byte_sum: i64,
    revert_comments: u64,
}

fn section_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\*\s*(.*?)\s*\*/").unwrap())
}

pub fn analyze_heuristically(
    page_title: &str,
    timeline: &[TimelineEntry],
    clock: &SharedClock,
) -> AnalysisRecord {
    if timeline.is_empty() {
        return AnalysisRecord::placeholder(page_title, clock.now_utc());
    }

    let mut per_editor: HashMap<String, EditorStats> = HashMap::new();
    let mut changes = Vec::with_capacity(timeline.len());

    for entry in timeline {
        changes.push(entry.byte_change);
        let comment_lower = entry.comment.to_lowercase();
        let mentions_revert = REVERT_TOKENS.iter().any(|t| comment_lower.contains(t));

        let stats = per_editor.entry(entry.user.clone()).or_insert(EditorStats {
            edit_count: 0,
            byte_sum: 0,
            revert_comments: 0,
        });
        stats.edit_count += 1;
        stats.byte_sum += entry.byte_change;
        if mentions_revert {
            stats.revert_comments += 1;
        }
    }

    let revert_count = count_reverts(&changes);
    let editor_count = per_editor.len() as u64;
    let edit_count = timeline.len() as u64;
    let revert_ratio = revert_count as f64 / edit_count.max(1) as f64;

    let severity = severity_from_rubric(editor_count, edit_count, revert_ratio);
    let content_area = infer_content_area(timeline);
    let sides = build_sides(&per_editor);
    let recommendation = recommendation_for(severity);

    AnalysisRecord {
        page_title: page_title.to_string(),
        summary: format!(
            "Apparent edit war: {editor_count} editors made {edit_count} edits with {revert_count} apparent reverts."
        ),
        sides,
        content_area,
        severity,
        recommendation,
        edit_count,
        generated_at: clock.now_utc(),
        cache_hit: false,
    }
}

fn severity_from_rubric(editor_count: u64, edit_count: u64, revert_ratio: f64) -> AnalysisSeverity {
    let score = editor_count as f64 + revert_ratio * 10.0 + if edit_count > 15 { 2.0 } else { 0.0 };
    if score >= 12.0 {
        AnalysisSeverity::Critical
    } else if score >= 7.0 {
        AnalysisSeverity::High
    } else if score >= 3.0 {
        AnalysisSeverity::Moderate
    } else {
        AnalysisSeverity::Low
    }
}

fn infer_content_area(timeline: &[TimelineEntry]) -> String {
    for entry in timeline.iter().rev() {
        if let Some(cap) = section_marker_re().captures(&entry.comment) {
            let section = cap[1].trim();
            if !section.is_empty() {
                return section.to_string();
            }
        }
    }
    "general content".to_string()
}

fn role_for(stats: &EditorStats) -> String {
    if stats.revert_comments > 0 {
        role::REVERTER
    } else if stats.byte_sum > 0 {
        role::CONTENT_ADDER
    } else if stats.byte_sum < 0 {
        role::CONTENT_REMOVER
    } else {
        role::CONTRIBUTOR
    }
    .to_string()
}

fn build_sides(per_editor: &HashMap<String, EditorStats>) -> Vec<Side> {
    let mut adding = Vec::new();
    let mut removing = Vec::new();

    for (user, stats) in per_editor {
        let editor = SideEditor {
            user: user.clone(),
            edit_count: stats.edit_count,
            role: role_for(stats),
        };
        if stats.byte_sum < 0 {
            removing.push(editor);
        } else {
            adding.push(editor);
        }
    }

    if removing.is_empty() || adding.is_empty() {
        let mut all = adding;
        all.extend(removing);
        return vec![Side { position: "disputed content".to_string(), editors: all }];
    }

    vec![
        Side { position: "adding or restoring content".to_string(), editors: adding },
        Side { position: "removing or reverting content".to_string(), editors: removing },
    ]
}

fn recommendation_for(severity: AnalysisSeverity) -> String {
    match severity {
        AnalysisSeverity::Critical => {
            "Consider full protection and referral to edit-warring noticeboard.".to_string()
        }
        AnalysisSeverity::High => {
            "Consider semi-protection and a request for talk-page consensus.".to_string()
        }
        AnalysisSeverity::Moderate => {
            "Encourage editors to discuss the dispute on the talk page.".to_string()
        }
        AnalysisSeverity::Low | AnalysisSeverity::Unknown => {
            "Monitor the page; no action needed yet.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use chrono::Utc;

    fn entry(user: &str, byte_change: i64, comment: &str) -> TimelineEntry {
        TimelineEntry {
            user: user.into(),
            comment: comment.into(),
            byte_change,
            timestamp: 0,
            revision_id: None,
            server_url: "https://en.wikipedia.org".into(),
        }
    }

    #[test]
    fn placeholder_on_empty_timeline() {
        let clock: SharedClock = TestClock::new(Utc::now());
        let record = analyze_heuristically("Test", &[], &clock);
        assert_eq!(record.edit_count, 0);
        assert_eq!(record.severity, AnalysisSeverity::Unknown);
    }

    #[test]
    fn splits_sides_by_net_byte_sum() {
        let clock: SharedClock = TestClock::new(Utc::now());
        let timeline = vec![
            entry("adder", 500, "added info"),
            entry("remover", -500, "Reverted unsourced addition"),
        ];
        let record = analyze_heuristically("Test", &timeline, &clock);
        assert_eq!(record.sides.len(), 2);
    }

    #[test]
    fn single_side_when_all_editors_agree() {
        let clock: SharedClock = TestClock::new(Utc::now());
        let timeline = vec![entry("a", 500, ""), entry("b", 200, "")];
        let record = analyze_heuristically("Test", &timeline, &clock);
        assert_eq!(record.sides.len(), 1);
        assert_eq!(record.sides[0].position, "disputed content");
    }

    #[test]
    fn extracts_content_area_from_section_marker() {
        let timeline = vec![entry("a", 10, "/* History */ fixed typo")];
        assert_eq!(infer_content_area(&timeline), "History");
    }

    #[test]
    fn six_entry_timeline_yields_valid_severity_and_summary() {
        let clock: SharedClock = TestClock::new(Utc::now());
        let timeline = vec![
            entry("a", 500, "added section"),
            entry("b", -480, "Reverted 1 edit by a"),
            entry("a", 490, "restored content"),
            entry("b", -495, "rv unexplained removal"),
            entry("a", 500, "undid revision"),
            entry("b", -490, "revert again"),
        ];
        let record = analyze_heuristically("Test", &timeline, &clock);
        assert!(matches!(
            record.severity,
            AnalysisSeverity::Low | AnalysisSeverity::Moderate | AnalysisSeverity::High | AnalysisSeverity::Critical
        ));
        assert!(record.summary.to_lowercase().contains("edit war"));
        let sides_editors: usize = record.sides.iter().map(|s| s.editors.len()).sum();
        assert_eq!(sides_editors, 2);
    }
}
