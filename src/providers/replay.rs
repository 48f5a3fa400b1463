//! Replay provider for recorded feeds
//!
//! A recording is a JSON-lines file: one [`SnapshotBatch`] object per line, in arrival order.
//! Blank lines are skipped.
//!
//! Replayed batches always run on feed time. Lines without `captured_at_ms` are stamped from a
//! feed clock that advances by the recorded batch spacing and never trails the newest lap start
//! in the batch, so laps from an old recording are not mistaken for stale ones.

use std::path::Path;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::provider::FeedProvider;
use crate::types::SnapshotBatch;
use crate::{EngineError, Result};

/// Default spacing between recorded batches at 1x speed.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Replays a recorded feed at a configurable speed.
pub struct ReplayProvider {
    lines: Vec<String>,
    cursor: usize,
    batch_interval: Duration,
    /// Playback speed multiplier (1.0 = recorded pace).
    speed: f64,
    /// Created on first use so construction needs no runtime.
    interval: Option<Interval>,
    /// Feed time of the last stamped batch.
    feed_clock_ms: Option<u64>,
    name: String,
}

impl ReplayProvider {
    /// Load a recording from disk.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::file_error(path.to_path_buf(), e))?;
        let provider = Self::from_json_lines(&text).named(path.display().to_string());
        info!(path = %path.display(), batches = provider.len(), "Opened feed recording");
        Ok(provider)
    }

    /// Build from recording text already in memory.
    pub fn from_json_lines(text: &str) -> Self {
        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            lines,
            cursor: 0,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            speed: 1.0,
            interval: None,
            feed_clock_ms: None,
            name: "replay".to_string(),
        }
    }

    fn named(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// Change the recorded spacing between batches.
    pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
        self.batch_interval = batch_interval;
        self.interval = None;
        self
    }

    /// Set playback speed, clamped to 0.1x..=100x.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.1, 100.0);
        self.interval = None;
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Total batches in the recording.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Batches not yet delivered.
    pub fn remaining(&self) -> usize {
        self.lines.len() - self.cursor
    }

    fn effective_interval(&self) -> Duration {
        self.batch_interval.div_f64(self.speed)
    }

    fn stamp(&mut self, batch: &mut SnapshotBatch) {
        if batch.captured_at_ms.is_none() {
            let advanced =
                self.feed_clock_ms.map(|at| at + self.batch_interval.as_millis() as u64);
            let latest_start = batch
                .karts
                .iter()
                .filter_map(|kart| kart.lap_start)
                .filter(|ts| ts.is_finite() && *ts > 0.0)
                .map(|ts| (ts * 1000.0) as u64)
                .max();
            batch.captured_at_ms = advanced.max(latest_start);
        }
        if batch.captured_at_ms.is_some() {
            self.feed_clock_ms = batch.captured_at_ms;
        }
    }
}

fn pacing(period: Duration) -> Interval {
    let mut interval = interval(period.max(Duration::from_micros(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[async_trait::async_trait]
impl FeedProvider for ReplayProvider {
    async fn next_batch(&mut self) -> Result<Option<SnapshotBatch>> {
        let Some(line) = self.lines.get(self.cursor) else {
            return Ok(None);
        };
        let line_number = self.cursor + 1;
        // Advance first so a bad line is skipped on the next call.
        self.cursor += 1;

        let period = self.effective_interval();
        self.interval.get_or_insert_with(|| pacing(period)).tick().await;
        let mut batch: SnapshotBatch = serde_json::from_str(line)
            .map_err(|e| EngineError::parse(format!("recording line {line_number}"), e.to_string()))?;
        self.stamp(&mut batch);
        trace!(line = line_number, karts = batch.karts.len(), at = ?batch.captured_at_ms, "Replayed batch");
        Ok(Some(batch))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
