//! Lap store: the lap log together with every cache derived from it.
//!
//! [`LapStore`] is the explicit store object the engine threads through ingestion, rebuild and
//! eviction. Aggregates are always a function of the log: the incremental path in
//! [`LapStore::append`] and the full path in [`LapStore::rebuild`] produce the same values, and
//! eviction swaps the pruned log and its rebuilt aggregates in together.
//!
//! ## Import/export format
//!
//! [`StoreDocument`] is a JSON object with `laps`, `karts`, `drivers` and `sessions`. Only `laps`
//! is authoritative; importing always rebuilds kart and driver aggregates from it. Missing keys
//! deserialize to empty collections, and sessions referenced by laps but absent from `sessions`
//! are backfilled.

mod aggregate;
mod log;
mod retention;

pub use aggregate::{Aggregates, DriverAggregate, KartAggregate};
pub use log::LapLog;
pub use retention::{EvictionReport, SessionRecord, backfill_sessions, select_evictions};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::types::{KartKey, LapRecord};
use crate::{EngineError, Result};

/// Current export format version.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Serialized form of a [`LapStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub version: u32,
    pub laps: Vec<LapRecord>,
    pub karts: BTreeMap<KartKey, KartAggregate>,
    pub drivers: BTreeMap<String, DriverAggregate>,
    pub sessions: BTreeMap<String, SessionRecord>,
}

/// The lap log and its derived aggregates and session records.
#[derive(Debug, Clone)]
pub struct LapStore {
    log: LapLog,
    aggregates: Aggregates,
    sessions: BTreeMap<String, SessionRecord>,
    max_lap_ms: u32,
}

impl LapStore {
    pub fn new(max_lap_ms: u32, per_kart_capacity: usize) -> Self {
        Self {
            log: LapLog::new(per_kart_capacity),
            aggregates: Aggregates::default(),
            sessions: BTreeMap::new(),
            max_lap_ms,
        }
    }

    /// Append a record and update aggregates and the session record incrementally.
    pub fn append(&mut self, lap: LapRecord) {
        self.aggregates.apply(&lap, self.max_lap_ms);
        self.sessions
            .entry(lap.session_id.clone())
            .or_insert_with(|| SessionRecord::new(&lap.session_id, lap.recorded_at_ms))
            .record_lap(lap.recorded_at_ms);
        debug!(kart = %lap.kart_key, driver = %lap.driver_name, lap = lap.lap_number, ms = lap.lap_ms, "Lap appended");
        self.log.append(lap);
    }

    /// Discard the aggregates and fold them again from the log.
    pub fn rebuild(&mut self) {
        self.aggregates = Aggregates::rebuild(self.log.laps(), self.max_lap_ms);
        debug!(
            laps = self.log.len(),
            karts = self.aggregates.karts.len(),
            drivers = self.aggregates.drivers.len(),
            "Aggregates rebuilt"
        );
    }

    /// Evict the oldest sessions beyond `max_sessions`, then rebuild.
    ///
    /// The pruned log, session map and aggregates are computed aside and swapped in together.
    pub fn evict_old_sessions(&mut self, max_sessions: usize) -> Option<EvictionReport> {
        let evicted = select_evictions(&self.sessions, max_sessions);
        if evicted.is_empty() {
            return None;
        }

        let mut log = self.log.clone();
        let removed_laps = log.retain(|lap| !evicted.contains(&lap.session_id));
        let mut sessions = self.sessions.clone();
        for id in &evicted {
            sessions.remove(id);
        }
        let aggregates = Aggregates::rebuild(log.laps(), self.max_lap_ms);

        self.log = log;
        self.sessions = sessions;
        self.aggregates = aggregates;

        info!(
            evicted = evicted.len(),
            removed_laps,
            remaining = self.sessions.len(),
            "Evicted oldest sessions"
        );
        Some(EvictionReport {
            evicted_sessions: evicted,
            removed_laps,
            remaining_sessions: self.sessions.len(),
        })
    }

    pub fn log(&self) -> &LapLog {
        &self.log
    }

    pub fn laps(&self) -> &[LapRecord] {
        self.log.laps()
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn kart(&self, key: &str) -> Option<&KartAggregate> {
        self.aggregates.kart(key)
    }

    pub fn driver(&self, name: &str) -> Option<&DriverAggregate> {
        self.aggregates.driver(name)
    }

    pub fn sessions(&self) -> &BTreeMap<String, SessionRecord> {
        &self.sessions
    }

    pub fn max_lap_ms(&self) -> u32 {
        self.max_lap_ms
    }

    pub fn to_document(&self) -> StoreDocument {
        StoreDocument {
            version: STORE_FORMAT_VERSION,
            laps: self.log.laps().to_vec(),
            karts: self.aggregates.karts.clone(),
            drivers: self.aggregates.drivers.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Restore from a document. Aggregates are rebuilt from `laps`; stored rollups are ignored.
    pub fn from_document(
        document: StoreDocument,
        max_lap_ms: u32,
        per_kart_capacity: usize,
    ) -> Result<Self> {
        if document.version > STORE_FORMAT_VERSION {
            return Err(EngineError::Import {
                reason: format!(
                    "format version {} is newer than supported version {}",
                    document.version, STORE_FORMAT_VERSION
                ),
            });
        }

        let stored_karts = document.karts.len();
        let mut sessions = document.sessions;
        let backfilled = backfill_sessions(&mut sessions, &document.laps);
        if backfilled > 0 {
            warn!(backfilled, "Laps reference sessions without records; backfilled");
        }

        let mut store = Self {
            log: LapLog::from_laps(document.laps, per_kart_capacity),
            aggregates: Aggregates::default(),
            sessions,
            max_lap_ms,
        };
        store.rebuild();
        if stored_karts != store.aggregates.karts.len() {
            debug!(
                stored = stored_karts,
                rebuilt = store.aggregates.karts.len(),
                "Stored kart rollups disagreed with the lap log"
            );
        }
        Ok(store)
    }

    /// Serialize the whole store as JSON.
    pub fn export_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_document())?)
    }

    /// Parse an exported JSON document and rebuild from its laps.
    pub fn import_json(bytes: &[u8], max_lap_ms: u32, per_kart_capacity: usize) -> Result<Self> {
        let document: StoreDocument = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::parse("Lap store import", e.to_string()))?;
        Self::from_document(document, max_lap_ms, per_kart_capacity)
    }
}
