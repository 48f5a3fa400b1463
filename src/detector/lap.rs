//! Lap completion detection
//!
//! Successive snapshots of the same kart are compared against the last lap count seen for it; a
//! strictly higher count (or a kart seen for the first time) is one completed lap. Replaying an
//! unchanged snapshot never produces a second event.

use std::collections::{HashMap, VecDeque};
use tracing::trace;

use crate::types::{KartKey, KartSnapshot, LapHistoryEntry};

/// Per-kart detection state.
#[derive(Debug, Clone, Default)]
pub struct KartHistory {
    last_lap_count: u32,
    entries: VecDeque<LapHistoryEntry>,
}

impl KartHistory {
    pub fn last_lap_count(&self) -> u32 {
        self.last_lap_count
    }

    /// Rolling history, oldest first.
    pub fn entries(&self) -> &VecDeque<LapHistoryEntry> {
        &self.entries
    }
}

/// Emits one history entry per lap counter increment.
#[derive(Debug, Clone)]
pub struct LapEventDetector {
    capacity: usize,
    karts: HashMap<KartKey, KartHistory>,
}

impl LapEventDetector {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), karts: HashMap::new() }
    }

    /// Compare a snapshot against the kart's state and return the new history entry, if any.
    ///
    /// Karts without a last-lap time never enter the detector's state.
    pub fn observe(&mut self, snapshot: &KartSnapshot) -> Option<LapHistoryEntry> {
        let last_lap = snapshot.last_lap.as_ref()?;
        let key = snapshot.kart_key();

        if !self.is_new_lap(snapshot) {
            trace!(kart = %key, laps = snapshot.lap_count, "No lap increment");
            return None;
        }

        let best_time_ms = snapshot.best_lap.as_ref().map(|t| t.raw_ms);
        let delta_ms = best_time_ms.map_or(0, |best| i64::from(last_lap.raw_ms) - i64::from(best));
        let entry = LapHistoryEntry {
            lap_number: snapshot.lap_count,
            time: last_lap.display.clone(),
            time_ms: last_lap.raw_ms,
            best_time_ms,
            delta_ms,
            position: snapshot.position,
        };

        let history = self.karts.entry(key).or_default();
        history.last_lap_count = snapshot.lap_count;
        history.entries.push_back(entry.clone());
        while history.entries.len() > self.capacity {
            history.entries.pop_front();
        }

        Some(entry)
    }

    pub fn history(&self, key: &KartKey) -> Option<&KartHistory> {
        self.karts.get(key)
    }

    /// Whether [`observe`](Self::observe) would emit for `snapshot`. Never changes state.
    pub fn is_new_lap(&self, snapshot: &KartSnapshot) -> bool {
        snapshot.last_lap.is_some()
            && self
                .karts
                .get(&snapshot.kart_key())
                .is_none_or(|history| snapshot.lap_count > history.last_lap_count)
    }

    /// Length of the longest per-kart history.
    pub fn longest_history(&self) -> usize {
        self.karts.values().map(|h| h.entries.len()).max().unwrap_or(0)
    }

    /// Forget every kart.
    pub fn reset(&mut self) {
        self.karts.clear();
    }
}
