//! Session records and retention policy

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::LapRecord;

/// Retention bookkeeping for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(default)]
    pub first_lap_at_ms: u64,
    #[serde(default)]
    pub last_lap_at_ms: u64,
    #[serde(default)]
    pub lap_count: u32,
}

impl SessionRecord {
    pub fn new(session_id: &str, at_ms: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            first_lap_at_ms: at_ms,
            last_lap_at_ms: at_ms,
            lap_count: 0,
        }
    }

    pub fn record_lap(&mut self, at_ms: u64) {
        self.lap_count += 1;
        self.first_lap_at_ms = self.first_lap_at_ms.min(at_ms);
        self.last_lap_at_ms = self.last_lap_at_ms.max(at_ms);
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct EvictionReport {
    pub evicted_sessions: Vec<String>,
    pub removed_laps: usize,
    pub remaining_sessions: usize,
}

/// Sessions to evict so at most `max_sessions` remain, oldest last-lap first.
///
/// Ties on the timestamp break on the session id so the choice is deterministic.
pub fn select_evictions(
    sessions: &BTreeMap<String, SessionRecord>,
    max_sessions: usize,
) -> Vec<String> {
    if sessions.len() <= max_sessions {
        return Vec::new();
    }
    let mut by_age: Vec<&SessionRecord> = sessions.values().collect();
    by_age.sort_by(|a, b| {
        a.last_lap_at_ms.cmp(&b.last_lap_at_ms).then_with(|| a.session_id.cmp(&b.session_id))
    });
    by_age
        .into_iter()
        .take(sessions.len() - max_sessions)
        .map(|record| record.session_id.clone())
        .collect()
}

/// Add records for sessions that only the lap log knows about.
///
/// Returns the number of records created.
pub fn backfill_sessions(sessions: &mut BTreeMap<String, SessionRecord>, laps: &[LapRecord]) -> usize {
    let mut missing: BTreeMap<String, SessionRecord> = BTreeMap::new();
    for lap in laps.iter().filter(|lap| !sessions.contains_key(&lap.session_id)) {
        missing
            .entry(lap.session_id.clone())
            .or_insert_with(|| SessionRecord::new(&lap.session_id, lap.recorded_at_ms))
            .record_lap(lap.recorded_at_ms);
    }
    let created = missing.len();
    sessions.extend(missing);
    created
}
