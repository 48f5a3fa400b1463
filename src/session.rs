//! Per-session tracking state
//!
//! Everything here lives for one session only and is discarded on a session reset. The lap log
//! and aggregates are not part of it: they persist across sessions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::types::{KartKey, KartSnapshot, LapEvent, LapHistoryEntry};

/// Fastest lap of the session so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct SessionBest {
    pub kart_key: KartKey,
    pub kart_number: String,
    pub driver_name: Option<String>,
    pub lap_number: u32,
    pub lap_ms: u32,
}

/// Session-scoped view of one kart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KartSessionState {
    pub kart_number: String,
    pub driver_name: Option<String>,
    /// Position changes, oldest first.
    pub positions: VecDeque<u32>,
    /// Gap changes, oldest first.
    pub gaps: VecDeque<String>,
    pub last_position: Option<u32>,
    pub last_gap: Option<String>,
    pub last_best_lap_ms: Option<u32>,
    /// Every lap event of the session, including laps filtered out of the lap log.
    pub laps: Vec<LapHistoryEntry>,
}

impl KartSessionState {
    pub fn best_lap_ms(&self) -> Option<u32> {
        self.laps.iter().map(|lap| lap.time_ms).min()
    }
}

/// One kart's line in a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct KartResult {
    pub kart_key: KartKey,
    pub kart_number: String,
    pub driver_name: Option<String>,
    pub laps_completed: usize,
    pub best_lap_ms: Option<u32>,
    pub final_position: Option<u32>,
    pub laps: Vec<LapHistoryEntry>,
}

/// Snapshot of a finished session handed to the history collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct CompletedSession {
    pub session_id: String,
    pub session_key: String,
    pub event_name: String,
    pub session_name: String,
    pub track_config_id: Option<String>,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    /// The session ended because the lap counter restarted under the same name.
    pub restart_suspected: bool,
    pub session_best: Option<SessionBest>,
    pub winner: Option<KartResult>,
    /// Ordered by final position, then best lap.
    pub results: Vec<KartResult>,
}

/// Identity of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub session_key: String,
    pub event_name: String,
    pub session_name: String,
    pub track_config_id: Option<String>,
    pub started_at_ms: u64,
}

/// Per-session tracking state.
#[derive(Debug, Clone)]
pub struct SessionState {
    info: SessionInfo,
    capacity: usize,
    karts: BTreeMap<KartKey, KartSessionState>,
    session_best: Option<SessionBest>,
    last_update_ms: u64,
}

impl SessionState {
    pub fn new(info: SessionInfo, capacity: usize) -> Self {
        let last_update_ms = info.started_at_ms;
        Self {
            info,
            capacity: capacity.max(1),
            karts: BTreeMap::new(),
            session_best: None,
            last_update_ms,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    /// Track position, gap and best-lap changes from a snapshot.
    pub fn observe(&mut self, snapshot: &KartSnapshot, now_ms: u64) {
        self.last_update_ms = self.last_update_ms.max(now_ms);
        let capacity = self.capacity;
        let kart = self.karts.entry(snapshot.kart_key()).or_default();
        kart.kart_number.clone_from(&snapshot.kart_number);
        if snapshot.driver_name.is_some() {
            kart.driver_name.clone_from(&snapshot.driver_name);
        }

        if let Some(position) = snapshot.position {
            if kart.last_position != Some(position) {
                push_capped(&mut kart.positions, position, capacity);
                kart.last_position = Some(position);
            }
        }
        if let Some(gap) = &snapshot.gap {
            if kart.last_gap.as_ref() != Some(gap) {
                push_capped(&mut kart.gaps, gap.clone(), capacity);
                kart.last_gap = Some(gap.clone());
            }
        }
        if let Some(best) = &snapshot.best_lap {
            if kart.last_best_lap_ms.is_none_or(|last| best.raw_ms < last) {
                kart.last_best_lap_ms = Some(best.raw_ms);
            }
        }
    }

    /// Record a lap event; returns `true` when it is a new session best.
    pub fn record_lap(&mut self, event: &LapEvent) -> bool {
        let kart = self.karts.entry(event.kart_key.clone()).or_default();
        kart.kart_number.clone_from(&event.kart_number);
        kart.laps.push(event.entry.clone());

        let lap_ms = event.entry.time_ms;
        if self.session_best.as_ref().is_some_and(|best| best.lap_ms <= lap_ms) {
            return false;
        }
        self.session_best = Some(SessionBest {
            kart_key: event.kart_key.clone(),
            kart_number: event.kart_number.clone(),
            driver_name: event.driver_name.clone(),
            lap_number: event.entry.lap_number,
            lap_ms,
        });
        true
    }

    pub fn kart(&self, key: &str) -> Option<&KartSessionState> {
        self.karts.get(key)
    }

    pub fn session_best(&self) -> Option<&SessionBest> {
        self.session_best.as_ref()
    }

    pub fn lap_count(&self) -> usize {
        self.karts.values().map(|k| k.laps.len()).sum()
    }

    /// Freeze the state into a [`CompletedSession`].
    pub fn complete(&self, restart_suspected: bool) -> CompletedSession {
        let mut results: Vec<KartResult> = self
            .karts
            .iter()
            .filter(|(_, kart)| !kart.laps.is_empty())
            .map(|(key, kart)| KartResult {
                kart_key: key.clone(),
                kart_number: kart.kart_number.clone(),
                driver_name: kart.driver_name.clone(),
                laps_completed: kart.laps.len(),
                best_lap_ms: kart.best_lap_ms(),
                final_position: kart.last_position,
                laps: kart.laps.clone(),
            })
            .collect();
        results.sort_by(|a, b| {
            let position = |r: &KartResult| r.final_position.unwrap_or(u32::MAX);
            let best = |r: &KartResult| r.best_lap_ms.unwrap_or(u32::MAX);
            position(a).cmp(&position(b)).then(best(a).cmp(&best(b)))
        });

        let winner = results
            .iter()
            .find(|r| r.final_position == Some(1))
            .or_else(|| results.iter().filter(|r| r.best_lap_ms.is_some()).min_by_key(|r| r.best_lap_ms))
            .cloned();

        CompletedSession {
            session_id: self.info.session_id.clone(),
            session_key: self.info.session_key.clone(),
            event_name: self.info.event_name.clone(),
            session_name: self.info.session_name.clone(),
            track_config_id: self.info.track_config_id.clone(),
            started_at_ms: self.info.started_at_ms,
            ended_at_ms: self.last_update_ms,
            restart_suspected,
            session_best: self.session_best.clone(),
            winner,
            results,
        }
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    queue.push_back(value);
    while queue.len() > capacity {
        queue.pop_front();
    }
}
