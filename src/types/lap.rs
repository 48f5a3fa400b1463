//! Lap-level types: times, records, history entries and events

use serde::{Deserialize, Serialize};

use super::KartKey;

/// A lap time as both raw milliseconds and the feed's display string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LapTime {
    pub raw_ms: u32,
    pub display: String,
}

impl LapTime {
    /// Build from raw milliseconds, formatting the display string.
    pub fn from_ms(raw_ms: u32) -> Self {
        Self { raw_ms, display: format_lap_time(raw_ms) }
    }
}

/// Format milliseconds as `M:SS.mmm`, or `SS.mmm` under a minute.
pub fn format_lap_time(ms: u32) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    if minutes > 0 {
        format!("{minutes}:{seconds:02}.{millis:03}")
    } else {
        format!("{seconds}.{millis:03}")
    }
}

/// One completed lap, immutable once appended to the lap log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub session_id: String,
    pub kart_key: KartKey,
    pub base_kart_id: String,
    pub kart_number: String,
    #[serde(default)]
    pub kart_name: Option<String>,
    pub driver_name: String,
    pub lap_number: u32,
    /// Raw lap time in milliseconds.
    pub lap_ms: u32,
    /// Milliseconds since the epoch when the record was created.
    pub recorded_at_ms: u64,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub track_config_id: Option<String>,
}

impl LapRecord {
    /// Whether the lap passes the analysis validity filter.
    pub fn is_valid(&self, max_lap_ms: u32) -> bool {
        self.lap_ms <= max_lap_ms
    }

    pub fn on_track(&self, track_config_id: Option<&str>) -> bool {
        match track_config_id {
            Some(track) => self.track_config_id.as_deref() == Some(track),
            None => true,
        }
    }
}

/// Entry in a kart's rolling lap history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LapHistoryEntry {
    pub lap_number: u32,
    pub time: String,
    pub time_ms: u32,
    pub best_time_ms: Option<u32>,
    /// Last lap minus best lap; zero when either is unknown.
    pub delta_ms: i64,
    pub position: Option<u32>,
}

/// Synchronous "lap completed" event handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LapEvent {
    pub session_id: String,
    pub kart_key: KartKey,
    pub kart_number: String,
    pub driver_name: Option<String>,
    pub track_config_id: Option<String>,
    pub entry: LapHistoryEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_lap_times() {
        assert_eq!(format_lap_time(27_500), "27.500");
        assert_eq!(format_lap_time(61_042), "1:01.042");
        assert_eq!(format_lap_time(0), "0.000");
    }

    #[test]
    fn validity_filter_is_inclusive() {
        let mut lap = LapRecord {
            session_id: "s1".to_string(),
            kart_key: KartKey::new(None, "7"),
            base_kart_id: "7".to_string(),
            kart_number: "7".to_string(),
            kart_name: None,
            driver_name: "Ana".to_string(),
            lap_number: 1,
            lap_ms: 60_000,
            recorded_at_ms: 0,
            position: None,
            track_config_id: Some("t1".to_string()),
        };
        assert!(lap.is_valid(60_000));
        lap.lap_ms = 60_001;
        assert!(!lap.is_valid(60_000));

        assert!(lap.on_track(None));
        assert!(lap.on_track(Some("t1")));
        assert!(!lap.on_track(Some("t2")));
    }
}
