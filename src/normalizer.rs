//! Snapshot normalization
//!
//! Validates one [`RawKartFrame`] and coerces it into a [`KartSnapshot`]. Identity fields are
//! trimmed and blank strings become `None`; raw times that are zero or negative are treated as
//! absent, so nothing downstream ever compares against a nonsensical value.

use tracing::trace;

use crate::types::{KartSnapshot, LapTime, RawKartFrame};
use crate::{EngineError, Result};

/// Normalize a raw frame.
///
/// `batch_track` is the batch-level track configuration, used when the frame carries none.
///
/// # Errors
///
/// Returns [`EngineError::MalformedSnapshot`] when the frame has no kart number.
pub fn normalize(raw: &RawKartFrame, batch_track: Option<&str>) -> Result<KartSnapshot> {
    let kart_number = clean(raw.kart_number.as_deref()).ok_or(EngineError::malformed("kart_number"))?;

    let last_lap = lap_time(raw.last_time_raw, raw.last_time.as_deref());
    let best_lap = lap_time(raw.best_time_raw, raw.best_time.as_deref());
    if raw.last_time_raw.is_some() && last_lap.is_none() {
        trace!(kart = %kart_number, raw = ?raw.last_time_raw, "Discarding non-positive last lap time");
    }

    let lap_started_at = raw.lap_start.filter(|ts| ts.is_finite() && *ts > 0.0);

    Ok(KartSnapshot {
        kart_id: clean(raw.kart_id.as_deref()),
        kart_name: clean(raw.kart_name.as_deref()),
        driver_name: clean(raw.driver_name.as_deref()),
        lap_count: raw.total_laps.unwrap_or(0),
        last_lap,
        best_lap,
        position: raw.position,
        gap: clean(raw.gap.as_deref()),
        interval: clean(raw.interval.as_deref()),
        lap_started_at,
        track_config_id: clean(raw.track_config_id.as_deref()).or_else(|| clean(batch_track)),
        kart_number,
    })
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn lap_time(raw: Option<i64>, display: Option<&str>) -> Option<LapTime> {
    let raw_ms = raw.filter(|ms| *ms > 0).and_then(|ms| u32::try_from(ms).ok())?;
    Some(match clean(display) {
        Some(display) => LapTime { raw_ms, display },
        None => LapTime::from_ms(raw_ms),
    })
}
