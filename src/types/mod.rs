//! Core types for lap-timing data representation.
//!
//! ## Architecture
//!
//! - [`SnapshotBatch`] / [`RawKartFrame`] are the loosely typed frames a timing feed delivers
//! - [`KartSnapshot`] is the strict per-kart record the normalizer produces
//! - [`LapRecord`] is one immutable entry of the lap log
//! - [`LapEvent`] / [`LapHistoryEntry`] describe a detected lap completion
//! - [`KartKey`] is the composite identity (`trackConfigId_baseKartId`) aggregates are keyed by

mod kart_key;
mod lap;
mod snapshot;
mod update_rate;

pub use kart_key::KartKey;
pub use lap::{LapEvent, LapHistoryEntry, LapRecord, LapTime, format_lap_time};
pub use snapshot::{KartSnapshot, RawKartFrame, SnapshotBatch};
pub use update_rate::UpdateRate;
