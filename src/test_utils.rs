//! Test utilities: builders for snapshots, batches and lap records
//!
//! Shared by unit tests, integration tests and benchmarks so fixtures read the same everywhere.

#![cfg(any(test, feature = "benchmark"))]

use crate::types::{KartKey, KartSnapshot, LapRecord, LapTime, RawKartFrame, SnapshotBatch};

/// A normalized snapshot with a last-lap time and no track configuration.
pub fn snapshot(kart_number: &str, driver: &str, lap_count: u32, last_ms: u32) -> KartSnapshot {
    KartSnapshot {
        kart_number: kart_number.to_string(),
        kart_id: None,
        kart_name: None,
        driver_name: Some(driver.to_string()),
        lap_count,
        last_lap: Some(LapTime::from_ms(last_ms)),
        best_lap: None,
        position: Some(1),
        gap: None,
        interval: None,
        lap_started_at: None,
        track_config_id: None,
    }
}

/// A raw feed frame for one kart.
pub fn frame(kart_number: &str, driver: &str, total_laps: u32, last_ms: u32) -> RawKartFrame {
    RawKartFrame {
        kart_number: Some(kart_number.to_string()),
        driver_name: Some(driver.to_string()),
        total_laps: Some(total_laps),
        last_time_raw: Some(i64::from(last_ms)),
        position: Some(1),
        ..Default::default()
    }
}

/// A batch for a single event/session.
pub fn batch(session_name: &str, current_lap: u32, karts: Vec<RawKartFrame>) -> SnapshotBatch {
    SnapshotBatch {
        event_name: "Test Event".to_string(),
        session_name: session_name.to_string(),
        current_lap,
        time_remaining: None,
        track_config_id: None,
        captured_at_ms: None,
        karts,
    }
}

/// A lap record without a track configuration, recorded at time zero.
pub fn lap(session_id: &str, kart: &str, driver: &str, lap_number: u32, lap_ms: u32) -> LapRecord {
    lap_at(session_id, kart, driver, lap_number, lap_ms, 0)
}

/// A lap record with an explicit creation timestamp.
pub fn lap_at(
    session_id: &str,
    kart: &str,
    driver: &str,
    lap_number: u32,
    lap_ms: u32,
    recorded_at_ms: u64,
) -> LapRecord {
    LapRecord {
        session_id: session_id.to_string(),
        kart_key: KartKey::new(None, kart),
        base_kart_id: kart.to_string(),
        kart_number: kart.to_string(),
        kart_name: None,
        driver_name: driver.to_string(),
        lap_number,
        lap_ms,
        recorded_at_ms,
        position: None,
        track_config_id: None,
    }
}

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
