//! Lap observers and the built-in personal-best tracker

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::LapEvent;

/// Map key used for laps without a track configuration.
pub const UNKNOWN_TRACK: &str = "default";

/// Receives every lap event synchronously, in registration order.
///
/// Observers run inside ingestion and must not block.
pub trait LapObserver: Send {
    fn on_lap(&mut self, event: &LapEvent);
}

impl<F> LapObserver for F
where
    F: FnMut(&LapEvent) + Send,
{
    fn on_lap(&mut self, event: &LapEvent) {
        self(event)
    }
}

/// A driver's best valid lap on one track configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct PersonalBest {
    pub driver_name: String,
    pub track_config_id: Option<String>,
    pub lap_ms: u32,
    pub kart_number: String,
    pub session_id: String,
    pub lap_number: u32,
}

/// A new personal best, with the time it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct PersonalBestImprovement {
    pub previous_ms: Option<u32>,
    pub best: PersonalBest,
}

/// Personal bests keyed by driver, then track configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalBestTracker {
    bests: BTreeMap<String, BTreeMap<String, PersonalBest>>,
}

impl PersonalBestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a lap; returns the improvement when it beats the driver's best on that track.
    ///
    /// Laps without a driver or over `max_lap_ms` never count.
    pub fn record(&mut self, event: &LapEvent, max_lap_ms: u32) -> Option<PersonalBestImprovement> {
        let driver = event.driver_name.as_deref()?;
        let lap_ms = event.entry.time_ms;
        if lap_ms == 0 || lap_ms > max_lap_ms {
            return None;
        }

        let track = event.track_config_id.as_deref().unwrap_or(UNKNOWN_TRACK);
        let per_track = self.bests.entry(driver.to_string()).or_default();
        let previous_ms = per_track.get(track).map(|pb| pb.lap_ms);
        if previous_ms.is_some_and(|previous| previous <= lap_ms) {
            return None;
        }

        let best = PersonalBest {
            driver_name: driver.to_string(),
            track_config_id: event.track_config_id.clone(),
            lap_ms,
            kart_number: event.kart_number.clone(),
            session_id: event.session_id.clone(),
            lap_number: event.entry.lap_number,
        };
        debug!(driver, track, lap_ms, ?previous_ms, "Personal best improved");
        per_track.insert(track.to_string(), best.clone());
        Some(PersonalBestImprovement { previous_ms, best })
    }

    pub fn get(&self, driver: &str, track_config_id: Option<&str>) -> Option<&PersonalBest> {
        self.bests.get(driver)?.get(track_config_id.unwrap_or(UNKNOWN_TRACK))
    }

    /// All personal bests of one driver.
    pub fn for_driver(&self, driver: &str) -> impl Iterator<Item = &PersonalBest> {
        self.bests.get(driver).into_iter().flat_map(|tracks| tracks.values())
    }

    pub fn len(&self) -> usize {
        self.bests.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KartKey, LapHistoryEntry, format_lap_time};

    fn event(driver: Option<&str>, track: Option<&str>, ms: u32) -> LapEvent {
        LapEvent {
            session_id: "s1".to_string(),
            kart_key: KartKey::new(track, "7"),
            kart_number: "7".to_string(),
            driver_name: driver.map(str::to_string),
            track_config_id: track.map(str::to_string),
            entry: LapHistoryEntry {
                lap_number: 3,
                time: format_lap_time(ms),
                time_ms: ms,
                best_time_ms: None,
                delta_ms: 0,
                position: None,
            },
        }
    }

    #[test]
    fn improvements_are_reported_once() {
        let mut tracker = PersonalBestTracker::new();
        let first = tracker.record(&event(Some("Ana"), None, 30_000), 60_000).unwrap();
        assert_eq!(first.previous_ms, None);

        assert!(tracker.record(&event(Some("Ana"), None, 30_000), 60_000).is_none());
        assert!(tracker.record(&event(Some("Ana"), None, 31_000), 60_000).is_none());

        let better = tracker.record(&event(Some("Ana"), None, 29_500), 60_000).unwrap();
        assert_eq!(better.previous_ms, Some(30_000));
        assert_eq!(tracker.get("Ana", None).unwrap().lap_ms, 29_500);
    }

    #[test]
    fn bests_are_tracked_per_track() {
        let mut tracker = PersonalBestTracker::new();
        tracker.record(&event(Some("Ana"), Some("t1"), 30_000), 60_000);
        tracker.record(&event(Some("Ana"), Some("t2"), 35_000), 60_000);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get("Ana", Some("t2")).unwrap().lap_ms, 35_000);
        assert_eq!(tracker.for_driver("Ana").count(), 2);
        assert!(tracker.get("Ana", None).is_none());
    }

    #[test]
    fn invalid_laps_and_anonymous_drivers_are_ignored() {
        let mut tracker = PersonalBestTracker::new();
        assert!(tracker.record(&event(Some("Ana"), None, 61_000), 60_000).is_none());
        assert!(tracker.record(&event(None, None, 30_000), 60_000).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &LapEvent| seen.push(event.entry.time_ms);
            observer.on_lap(&event(Some("Ana"), None, 30_000));
        }
        assert_eq!(seen, vec![30_000]);
    }

    #[test]
    fn serializes_as_nested_map() {
        let mut tracker = PersonalBestTracker::new();
        tracker.record(&event(Some("Ana"), None, 30_000), 60_000);
        let json = serde_json::to_string(&tracker).unwrap();
        assert!(json.starts_with(r#"{"Ana":{"default":"#));
        let back: PersonalBestTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tracker);
    }
}
