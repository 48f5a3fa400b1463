//! Telemetry snapshot types
//!
//! [`SnapshotBatch`] and [`RawKartFrame`] mirror what a timing feed delivers: every field is
//! optional and loosely typed (kart numbers arrive as strings or integers, raw times may be
//! missing or negative). The [`normalizer`](crate::normalizer) turns each frame into a strict
//! [`KartSnapshot`] before anything else looks at it.

use serde::{Deserialize, Deserializer, Serialize};

use super::{KartKey, LapTime};

/// One telemetry batch: session metadata plus a frame for every kart on track.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotBatch {
    #[serde(alias = "event")]
    pub event_name: String,
    #[serde(alias = "session")]
    pub session_name: String,
    /// Race lap counter reported by the venue for the whole session.
    pub current_lap: u32,
    pub time_remaining: Option<String>,
    #[serde(alias = "track_configuration_id", deserialize_with = "opt_string_or_number")]
    pub track_config_id: Option<String>,
    /// Feed clock at capture, in milliseconds since the epoch.
    ///
    /// Recordings carry it (or have it stamped on replay) so lap staleness is judged against feed
    /// time; live feeds leave it empty and ingestion uses the wall clock.
    #[serde(alias = "timestamp_ms")]
    pub captured_at_ms: Option<u64>,
    #[serde(alias = "runs")]
    pub karts: Vec<RawKartFrame>,
}

impl SnapshotBatch {
    /// Session key joining event and session names.
    pub fn session_key(&self) -> String {
        format!("{} - {}", self.event_name.trim(), self.session_name.trim())
    }
}

/// One kart's frame exactly as the feed delivered it.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawKartFrame {
    #[serde(alias = "kart", deserialize_with = "opt_string_or_number")]
    pub kart_number: Option<String>,
    /// Stable identifier; display numbers can be reassigned by venue staff.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub kart_id: Option<String>,
    pub kart_name: Option<String>,
    #[serde(alias = "name")]
    pub driver_name: Option<String>,
    #[serde(alias = "laps")]
    pub total_laps: Option<u32>,
    pub last_time: Option<String>,
    pub last_time_raw: Option<i64>,
    pub best_time: Option<String>,
    pub best_time_raw: Option<i64>,
    #[serde(alias = "pos")]
    pub position: Option<u32>,
    pub gap: Option<String>,
    #[serde(alias = "int")]
    pub interval: Option<String>,
    /// Seconds since the epoch when the current lap started.
    pub lap_start: Option<f64>,
    #[serde(deserialize_with = "opt_string_or_number")]
    pub track_config_id: Option<String>,
}

/// Canonical per-kart record produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct KartSnapshot {
    pub kart_number: String,
    pub kart_id: Option<String>,
    pub kart_name: Option<String>,
    pub driver_name: Option<String>,
    pub lap_count: u32,
    pub last_lap: Option<LapTime>,
    pub best_lap: Option<LapTime>,
    pub position: Option<u32>,
    pub gap: Option<String>,
    pub interval: Option<String>,
    pub lap_started_at: Option<f64>,
    pub track_config_id: Option<String>,
}

impl KartSnapshot {
    /// Stable kart identifier, falling back to the display number.
    pub fn base_kart_id(&self) -> &str {
        self.kart_id.as_deref().unwrap_or(&self.kart_number)
    }

    pub fn kart_key(&self) -> KartKey {
        KartKey::new(self.track_config_id.as_deref(), self.base_kart_id())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Integer(i64),
    Float(f64),
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        StringOrNumber::Text(s) => s,
        StringOrNumber::Integer(i) => i.to_string(),
        StringOrNumber::Float(f) => f.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_feed_aliases() {
        let json = r#"{
            "event": "Thursday Cup",
            "session": "Heat 3",
            "current_lap": 4,
            "track_config_id": 2,
            "timestamp_ms": 1700000000000,
            "runs": [
                {"kart": 7, "name": "Ana", "laps": 3, "last_time_raw": 28000, "pos": 1, "int": "+0.4"}
            ]
        }"#;

        let batch: SnapshotBatch = serde_json::from_str(json).expect("batch parses");
        assert_eq!(batch.session_key(), "Thursday Cup - Heat 3");
        assert_eq!(batch.track_config_id.as_deref(), Some("2"));
        assert_eq!(batch.captured_at_ms, Some(1_700_000_000_000));
        assert_eq!(batch.karts.len(), 1);

        let kart = &batch.karts[0];
        assert_eq!(kart.kart_number.as_deref(), Some("7"));
        assert_eq!(kart.driver_name.as_deref(), Some("Ana"));
        assert_eq!(kart.total_laps, Some(3));
        assert_eq!(kart.position, Some(1));
        assert_eq!(kart.interval.as_deref(), Some("+0.4"));
        assert_eq!(kart.kart_id, None);
    }

    #[test]
    fn missing_fields_default() {
        let batch: SnapshotBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.karts.is_empty());
        assert_eq!(batch.current_lap, 0);
        assert_eq!(batch.track_config_id, None);
        assert_eq!(batch.captured_at_ms, None);
    }

    #[test]
    fn kart_key_falls_back_to_display_number() {
        let snapshot = KartSnapshot {
            kart_number: "12".to_string(),
            kart_id: None,
            kart_name: None,
            driver_name: Some("Bo".to_string()),
            lap_count: 1,
            last_lap: None,
            best_lap: None,
            position: None,
            gap: None,
            interval: None,
            lap_started_at: None,
            track_config_id: Some("t9".to_string()),
        };
        assert_eq!(snapshot.kart_key().as_str(), "t9_12");

        let with_id = KartSnapshot { kart_id: Some("K-3".to_string()), ..snapshot };
        assert_eq!(with_id.kart_key().as_str(), "t9_K-3");
        assert_eq!(with_id.base_kart_id(), "K-3");
    }
}
