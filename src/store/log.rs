//! The append-only lap log

use std::collections::{HashMap, VecDeque};

use crate::types::{KartKey, LapRecord};

/// Global ordered list of lap records plus a bounded recent view per kart.
///
/// The global list is the only source of truth; the per-kart view is derived from it and
/// rebuilt whenever records are removed.
#[derive(Debug, Clone)]
pub struct LapLog {
    laps: Vec<LapRecord>,
    recent: HashMap<KartKey, VecDeque<LapRecord>>,
    per_kart_capacity: usize,
}

impl LapLog {
    pub fn new(per_kart_capacity: usize) -> Self {
        Self { laps: Vec::new(), recent: HashMap::new(), per_kart_capacity: per_kart_capacity.max(1) }
    }

    /// Build a log from existing records, preserving their order.
    pub fn from_laps(laps: Vec<LapRecord>, per_kart_capacity: usize) -> Self {
        let mut log = Self::new(per_kart_capacity);
        log.laps = laps;
        log.reindex();
        log
    }

    pub fn append(&mut self, lap: LapRecord) {
        self.push_recent(lap.clone());
        self.laps.push(lap);
    }

    /// Keep only records matching `keep`; returns how many were removed.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&LapRecord) -> bool,
    {
        let before = self.laps.len();
        self.laps.retain(keep);
        let removed = before - self.laps.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn laps(&self) -> &[LapRecord] {
        &self.laps
    }

    /// Most recent laps for one kart, oldest first.
    pub fn recent(&self, key: &str) -> impl Iterator<Item = &LapRecord> {
        self.recent.get(key).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.laps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }

    fn push_recent(&mut self, lap: LapRecord) {
        let recent = self.recent.entry(lap.kart_key.clone()).or_default();
        recent.push_back(lap);
        while recent.len() > self.per_kart_capacity {
            recent.pop_front();
        }
    }

    fn reindex(&mut self) {
        self.recent.clear();
        let laps = std::mem::take(&mut self.laps);
        for lap in &laps {
            self.push_recent(lap.clone());
        }
        self.laps = laps;
    }
}
