//! Shared helper for reading a page's edit-war timeline back out of the
//! store in chronological order. Used by both the edit-war detector
//! (start-time reconstruction) and the analysis service (prompt building,
//! heuristic fallback).

use crate::error::Result;
use crate::model::TimelineEntry;
use crate::store::{Keys, Store};

pub(crate) async fn read_timeline(store: &Store, page: &str) -> Result<Vec<TimelineEntry>> {
    let raw = store.lrange_all(&Keys::editwar_timeline(page)).await?;
    // stored newest-first via LPUSH; callers want chronological order
    let mut entries: Vec<TimelineEntry> = raw
        .iter()
        .rev()
        .filter_map(|s| serde_json::from_str(s).ok())
        .collect();
    entries.sort_by_key(|e: &TimelineEntry| e.timestamp);
    Ok(entries)
}
