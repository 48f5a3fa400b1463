//! The lap engine: ingestion pipeline and query surface
//!
//! [`LapEngine`] owns every stateful component and runs a single logical timeline. Each batch
//! goes through the same steps:
//!
//! 1. the session boundary detector decides whether the batch starts, continues or resets the
//!    session (a reset hands the outgoing session to history and clears per-session state);
//! 2. each kart frame is normalized, and malformed frames (no kart number or no driver) are
//!    dropped without touching any state;
//! 3. the lap event detector turns lap counter increments into [`LapEvent`]s, which feed the
//!    session state and every registered [`LapObserver`];
//! 4. laps passing the validity filters are appended to the lap store, updating aggregates
//!    incrementally;
//! 5. retention runs and, every few laps, the store is handed to the persistence worker.
//!
//! Nothing on this path waits on storage.

use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::analysis::{self, IncidentAnalysis, KartRanking};
use crate::config::EngineConfig;
use crate::detector::{KartHistory, LapEventDetector, ResetReason, SessionBoundaryDetector, SessionDecision};
use crate::normalizer::normalize;
use crate::observer::{LapObserver, PersonalBestImprovement, PersonalBestTracker};
use crate::persistence::{
    BlobStore, LAP_LOG_KEY, PERSONAL_BESTS_KEY, PersistenceHandle, SETTINGS_KEY,
};
use crate::session::{CompletedSession, SessionBest, SessionInfo, SessionState};
use crate::store::{DriverAggregate, EvictionReport, KartAggregate, LapStore};
use crate::types::{KartKey, KartSnapshot, LapEvent, LapRecord, SnapshotBatch};
use crate::{EngineError, Result};

/// Why a detected lap was kept out of the lap log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum RejectReason {
    OverMaxLapTime,
    /// The lap started longer ago than the staleness threshold.
    StaleLapStart,
    /// The frame had no driver; it was dropped before lap detection, so the lap stays pending.
    MissingDriver,
}

/// A lap event that was not appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct RejectedLap {
    pub kart_key: KartKey,
    pub lap_number: u32,
    pub lap_ms: u32,
    pub reason: RejectReason,
}

/// Everything one batch did to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct IngestReport {
    pub session_id: String,
    pub session_key: String,
    /// Set when this batch reset the session.
    pub reset: Option<ResetReason>,
    /// Identifier of the session the reset completed.
    pub completed_session_id: Option<String>,
    pub events: Vec<LapEvent>,
    pub appended: Vec<LapRecord>,
    pub rejected: Vec<RejectedLap>,
    /// Malformed kart frames dropped before lap detection (no kart number or no driver).
    pub dropped_snapshots: usize,
    pub new_session_best: Option<SessionBest>,
    pub personal_bests: Vec<PersonalBestImprovement>,
    pub eviction: Option<EvictionReport>,
    /// The store was handed to the persistence worker after this batch.
    pub persisted: bool,
}

/// An engine shared between the ingest task and query callers.
pub type SharedEngine = Arc<Mutex<LapEngine>>;

/// Ingestion pipeline plus the query surface over the lap store.
pub struct LapEngine {
    config: EngineConfig,
    boundary: SessionBoundaryDetector,
    detector: LapEventDetector,
    session: Option<SessionState>,
    store: LapStore,
    personal_bests: PersonalBestTracker,
    observers: Vec<Box<dyn LapObserver>>,
    persistence: Option<PersistenceHandle>,
    appended_since_persist: usize,
}

impl LapEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            boundary: SessionBoundaryDetector::new(config.session_reset),
            detector: LapEventDetector::new(config.history_capacity),
            session: None,
            store: LapStore::new(config.max_lap_ms, config.per_kart_log_capacity),
            personal_bests: PersonalBestTracker::new(),
            observers: Vec::new(),
            persistence: None,
            appended_since_persist: 0,
            config,
        }
    }

    /// Build an engine from persisted state.
    ///
    /// Stored settings override `fallback` when they parse and validate. The lap log bundle and
    /// personal bests are loaded when present. Any load or parse failure is logged and the
    /// affected part starts empty.
    pub async fn restore(blobs: &dyn BlobStore, fallback: EngineConfig) -> Self {
        let config = match load_settings(blobs).await {
            Ok(Some(config)) => config,
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "Stored settings unusable, using provided configuration");
                fallback
            }
        };
        let mut engine = Self::new(config);

        match blobs.load(LAP_LOG_KEY).await {
            Ok(Some(bytes)) => {
                if let Err(e) = engine.replace_store(&bytes) {
                    warn!(error = %e, "Stored lap log unusable, starting empty");
                }
            }
            Ok(None) => debug!("No stored lap log"),
            Err(e) => warn!(error = %e, "Failed to load lap log, starting empty"),
        }

        match blobs.load(PERSONAL_BESTS_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(bests) => engine.personal_bests = bests,
                Err(e) => warn!(error = %e, "Stored personal bests unusable, starting empty"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load personal bests, starting empty"),
        }

        info!(
            laps = engine.store.laps().len(),
            karts = engine.store.aggregates().karts.len(),
            sessions = engine.store.sessions().len(),
            personal_bests = engine.personal_bests.len(),
            "Engine restored"
        );
        engine
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Route persistence writes through `handle`.
    pub fn attach_persistence(&mut self, handle: PersistenceHandle) {
        self.persistence = Some(handle);
    }

    /// Register an observer; observers are called in registration order.
    pub fn register_observer<O>(&mut self, observer: O)
    where
        O: LapObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Ingest a batch as of its feed timestamp, or the wall clock when it has none.
    pub fn ingest(&mut self, batch: &SnapshotBatch) -> IngestReport {
        self.ingest_at(batch, batch.captured_at_ms.unwrap_or_else(now_ms))
    }

    /// Ingest a batch as of `now_ms` (milliseconds since the epoch).
    pub fn ingest_at(&mut self, batch: &SnapshotBatch, now_ms: u64) -> IngestReport {
        let session_key = batch.session_key();
        let decision =
            self.boundary.evaluate(&session_key, batch.current_lap, self.detector.longest_history());

        let mut report = IngestReport { session_key: session_key.clone(), ..Default::default() };
        match decision {
            SessionDecision::Start | SessionDecision::Continue => {}
            SessionDecision::Reset(reason) => {
                let restart = matches!(reason, ResetReason::LapCounterRestart { .. });
                info!(?reason, "Session reset");
                report.completed_session_id =
                    self.finish_session(restart).map(|completed| completed.session_id);
                report.reset = Some(reason);
            }
        }
        if self.session.is_none() {
            self.begin_session(batch, &session_key, now_ms);
        }

        let stale_after_ms = self.config.stale_lap_after().as_millis() as f64;
        let max_lap_ms = self.config.max_lap_ms;
        let batch_track = batch.track_config_id.as_deref();

        for raw in &batch.karts {
            let snapshot = match normalize(raw, batch_track) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed kart frame");
                    report.dropped_snapshots += 1;
                    continue;
                }
            };
            trace!(kart = %snapshot.kart_number, laps = snapshot.lap_count, "Snapshot");

            // Driverless frames are malformed: nothing below may see them.
            let Some(driver_name) = snapshot.driver_name.clone() else {
                report.dropped_snapshots += 1;
                if self.detector.is_new_lap(&snapshot) {
                    warn!(kart = %snapshot.kart_key(), lap = snapshot.lap_count, "Lap without driver dropped");
                    report.rejected.push(RejectedLap {
                        kart_key: snapshot.kart_key(),
                        lap_number: snapshot.lap_count,
                        lap_ms: snapshot.last_lap.as_ref().map_or(0, |t| t.raw_ms),
                        reason: RejectReason::MissingDriver,
                    });
                } else {
                    warn!(kart = %snapshot.kart_number, "Dropping kart frame without driver");
                }
                continue;
            };

            let Some(session) = self.session.as_mut() else { continue };
            session.observe(&snapshot, now_ms);

            let Some(entry) = self.detector.observe(&snapshot) else { continue };
            let event = LapEvent {
                session_id: session.session_id().to_string(),
                kart_key: snapshot.kart_key(),
                kart_number: snapshot.kart_number.clone(),
                driver_name: snapshot.driver_name.clone(),
                track_config_id: snapshot.track_config_id.clone(),
                entry,
            };
            debug!(kart = %event.kart_key, lap = event.entry.lap_number, ms = event.entry.time_ms, "Lap completed");

            if session.record_lap(&event) {
                report.new_session_best = session.session_best().cloned();
            }
            for observer in &mut self.observers {
                observer.on_lap(&event);
            }

            match admit(&snapshot, &event, driver_name, now_ms, max_lap_ms, stale_after_ms) {
                Ok(record) => {
                    if let Some(improvement) = self.personal_bests.record(&event, max_lap_ms) {
                        report.personal_bests.push(improvement);
                    }
                    self.store.append(record.clone());
                    report.appended.push(record);
                }
                Err(reason) => {
                    debug!(kart = %event.kart_key, ?reason, "Lap kept out of the log");
                    report.rejected.push(RejectedLap {
                        kart_key: event.kart_key.clone(),
                        lap_number: event.entry.lap_number,
                        lap_ms: event.entry.time_ms,
                        reason,
                    });
                }
            }
            report.events.push(event);
        }

        if let Some(session) = &self.session {
            report.session_id = session.session_id().to_string();
        }

        if !report.appended.is_empty() {
            report.eviction = self.store.evict_old_sessions(self.config.max_sessions);
            self.appended_since_persist += report.appended.len();
            if self.appended_since_persist >= self.config.persist_every_laps.max(1) {
                self.appended_since_persist = 0;
                report.persisted = self.persist();
            }
        }

        report
    }

    /// End the running session, handing it to history. Returns the completed snapshot.
    pub fn end_session(&mut self) -> Option<CompletedSession> {
        self.finish_session(false)
    }

    fn begin_session(&mut self, batch: &SnapshotBatch, session_key: &str, now_ms: u64) {
        let info = SessionInfo {
            session_id: format!("{now_ms}_{session_key}"),
            session_key: session_key.to_string(),
            event_name: batch.event_name.trim().to_string(),
            session_name: batch.session_name.trim().to_string(),
            track_config_id: batch.track_config_id.clone(),
            started_at_ms: now_ms,
        };
        info!(session = %info.session_id, "Session started");
        self.session = Some(SessionState::new(info, self.config.history_capacity));
    }

    fn finish_session(&mut self, restart_suspected: bool) -> Option<CompletedSession> {
        let state = self.session.take()?;
        self.detector.reset();

        let completed = state.complete(restart_suspected);
        info!(
            session = %completed.session_id,
            karts = completed.results.len(),
            laps = state.lap_count(),
            restart_suspected,
            "Session completed"
        );
        if !completed.results.is_empty() {
            if let Some(handle) = &self.persistence {
                if !handle.save_completed_session(completed.clone()) {
                    warn!(session = %completed.session_id, "Persistence worker stopped, session not saved");
                }
            }
        }
        Some(completed)
    }

    /// Hand the store bundle and personal bests to the persistence worker.
    pub fn persist(&mut self) -> bool {
        let Some(handle) = &self.persistence else {
            return false;
        };
        let bundle = match self.store.export_json() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize lap store");
                return false;
            }
        };
        let mut sent = handle.save_blob(LAP_LOG_KEY, bundle);
        match serde_json::to_vec(&self.personal_bests) {
            Ok(bytes) => sent &= handle.save_blob(PERSONAL_BESTS_KEY, bytes),
            Err(e) => warn!(error = %e, "Failed to serialize personal bests"),
        }
        if !sent {
            warn!("Persistence worker stopped, state not saved");
        }
        sent
    }

    /// Persist the current configuration as the `settings` blob.
    pub fn save_settings(&self) -> Result<bool> {
        let yaml = self.config.to_yaml()?;
        Ok(self
            .persistence
            .as_ref()
            .is_some_and(|handle| handle.save_blob(SETTINGS_KEY, yaml.into_bytes())))
    }

    pub fn kart_aggregate(&self, kart_key: &str) -> Option<&KartAggregate> {
        self.store.kart(kart_key)
    }

    pub fn driver_aggregate(&self, driver_name: &str) -> Option<&DriverAggregate> {
        self.store.driver(driver_name)
    }

    /// Ranked karts, optionally restricted to one track configuration.
    pub fn rank_karts(&self, track_config_id: Option<&str>) -> Vec<KartRanking> {
        analysis::rank_karts(&self.store, track_config_id, &self.config.ranking)
    }

    /// Incident analysis over the kart's recent laps.
    pub fn incidents(&self, kart_key: &str) -> IncidentAnalysis {
        analysis::detect_incidents(
            &KartKey::from(kart_key),
            self.store.log().recent(kart_key),
            &self.config.incidents,
        )
    }

    pub fn rebuild_aggregates(&mut self) {
        self.store.rebuild();
    }

    pub fn evict_old_sessions(&mut self) -> Option<EvictionReport> {
        self.store.evict_old_sessions(self.config.max_sessions)
    }

    pub fn export_json(&self) -> Result<Vec<u8>> {
        self.store.export_json()
    }

    /// Replace the whole store with an exported document, then persist it.
    ///
    /// On error the current store is left untouched.
    pub fn import_json(&mut self, bytes: &[u8]) -> Result<()> {
        self.replace_store(bytes)?;
        self.store.evict_old_sessions(self.config.max_sessions);
        self.persist();
        Ok(())
    }

    fn replace_store(&mut self, bytes: &[u8]) -> Result<()> {
        let store =
            LapStore::import_json(bytes, self.config.max_lap_ms, self.config.per_kart_log_capacity)?;
        info!(laps = store.laps().len(), sessions = store.sessions().len(), "Lap store imported");
        self.store = store;
        Ok(())
    }

    pub fn lap_history(&self, kart_key: &KartKey) -> Option<&KartHistory> {
        self.detector.history(kart_key)
    }

    pub fn current_session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn personal_bests(&self) -> &PersonalBestTracker {
        &self.personal_bests
    }

    pub fn store(&self) -> &LapStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Apply the lap log filters to a detected lap.
fn admit(
    snapshot: &KartSnapshot,
    event: &LapEvent,
    driver_name: String,
    now_ms: u64,
    max_lap_ms: u32,
    stale_after_ms: f64,
) -> std::result::Result<LapRecord, RejectReason> {
    if event.entry.time_ms > max_lap_ms {
        return Err(RejectReason::OverMaxLapTime);
    }
    if let Some(started_at) = snapshot.lap_started_at {
        if now_ms as f64 - started_at * 1000.0 > stale_after_ms {
            return Err(RejectReason::StaleLapStart);
        }
    }

    Ok(LapRecord {
        session_id: event.session_id.clone(),
        kart_key: event.kart_key.clone(),
        base_kart_id: snapshot.base_kart_id().to_string(),
        kart_number: snapshot.kart_number.clone(),
        kart_name: snapshot.kart_name.clone(),
        driver_name,
        lap_number: event.entry.lap_number,
        lap_ms: event.entry.time_ms,
        recorded_at_ms: now_ms,
        position: snapshot.position,
        track_config_id: snapshot.track_config_id.clone(),
    })
}

async fn load_settings(blobs: &dyn BlobStore) -> Result<Option<EngineConfig>> {
    let Some(bytes) = blobs.load(SETTINGS_KEY).await? else {
        return Ok(None);
    };
    let yaml = String::from_utf8(bytes).map_err(|e| EngineError::parse("Settings", e.to_string()))?;
    Ok(Some(EngineConfig::from_yaml_str(&yaml)?))
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}
