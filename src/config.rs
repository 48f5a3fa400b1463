//! Engine configuration
//!
//! Every threshold the engine applies is a policy knob rather than a constant. Settings are read
//! from YAML and any missing key falls back to its default, so a partial file such as
//!
//! ```yaml
//! max_sessions: 60
//! session_reset:
//!   restart_lap_threshold: 1
//! ```
//!
//! only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{EngineError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Laps slower than this are treated as incidents or system errors and never logged.
    pub max_lap_ms: u32,
    /// A lap whose start timestamp is older than this belongs to a ghost driver.
    pub stale_lap_after_secs: u64,
    /// Rolling per-kart lap history kept by the lap event detector.
    pub history_capacity: usize,
    /// Recent laps kept per kart in the lap log's bounded view.
    pub per_kart_log_capacity: usize,
    /// Session records retained before the oldest are evicted.
    pub max_sessions: usize,
    /// Appended laps between scheduled persistence saves.
    pub persist_every_laps: usize,
    pub session_reset: SessionResetPolicy,
    pub incidents: IncidentPolicy,
    pub ranking: RankingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lap_ms: 60_000,
            stale_lap_after_secs: 300,
            history_capacity: 20,
            per_kart_log_capacity: 100,
            max_sessions: 140,
            persist_every_laps: 10,
            session_reset: SessionResetPolicy::default(),
            incidents: IncidentPolicy::default(),
            ranking: RankingPolicy::default(),
        }
    }
}

/// Thresholds for the lap-counter restart heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionResetPolicy {
    /// A batch lap counter at or below this value may indicate a restart.
    pub restart_lap_threshold: u32,
    /// ...but only once some kart already holds more history entries than this.
    pub min_history_for_restart: usize,
}

impl Default for SessionResetPolicy {
    fn default() -> Self {
        Self { restart_lap_threshold: 2, min_history_for_restart: 3 }
    }
}

/// Incident detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentPolicy {
    pub min_valid_lap_ms: u32,
    pub max_valid_lap_ms: u32,
    /// Fraction trimmed from each end of the sorted window for the baseline.
    pub trim_fraction: f64,
    pub candidate_ratio: f64,
    pub severe_ratio: f64,
    /// The lap after a candidate must be faster than `candidate * recovery_ratio`.
    pub recovery_ratio: f64,
    pub min_window_laps: usize,
}

impl Default for IncidentPolicy {
    fn default() -> Self {
        Self {
            min_valid_lap_ms: 15_000,
            max_valid_lap_ms: 60_000,
            trim_fraction: 0.10,
            candidate_ratio: 1.30,
            severe_ratio: 1.50,
            recovery_ratio: 1.15,
            min_window_laps: 3,
        }
    }
}

/// Kart ranking knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingPolicy {
    /// Lap times closer than this are ranked as equal.
    pub tie_band_ms: f64,
    /// Weight of cross-kart driver ratios in the blended index.
    pub cross_kart_weight: f64,
    /// Cross-kart ratios required before blending kicks in.
    pub min_cross_kart_laps: usize,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self { tie_band_ms: 10.0, cross_kart_weight: 0.7, min_cross_kart_laps: 3 }
    }
}

impl EngineConfig {
    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| EngineError::parse("Engine configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| EngineError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded engine configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| EngineError::parse("Engine configuration", e.to_string()))
    }

    /// Staleness threshold as a duration.
    pub fn stale_lap_after(&self) -> Duration {
        Duration::from_secs(self.stale_lap_after_secs)
    }

    /// Reject settings that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.max_lap_ms == 0 {
            return Err(EngineError::config("max_lap_ms must be positive"));
        }
        if self.history_capacity == 0 || self.per_kart_log_capacity == 0 {
            return Err(EngineError::config("history capacities must be positive"));
        }
        if self.max_sessions == 0 {
            return Err(EngineError::config("max_sessions must be positive"));
        }
        let incidents = &self.incidents;
        if incidents.min_valid_lap_ms >= incidents.max_valid_lap_ms {
            return Err(EngineError::config("incident valid lap window is empty"));
        }
        if !(0.0..0.5).contains(&incidents.trim_fraction) {
            return Err(EngineError::config("trim_fraction must be in [0, 0.5)"));
        }
        if incidents.candidate_ratio <= 1.0 || incidents.severe_ratio < incidents.candidate_ratio {
            return Err(EngineError::config(
                "incident ratios must satisfy 1 < candidate_ratio <= severe_ratio",
            ));
        }
        if !(0.0..=1.0).contains(&self.ranking.cross_kart_weight) {
            return Err(EngineError::config("cross_kart_weight must be in [0, 1]"));
        }
        if self.ranking.tie_band_ms < 0.0 {
            return Err(EngineError::config("tie_band_ms must not be negative"));
        }
        Ok(())
    }
}
