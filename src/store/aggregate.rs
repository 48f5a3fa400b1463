//! Kart and driver rollups
//!
//! Aggregates are caches over the lap log. [`Aggregates::apply`] folds one lap in and
//! [`Aggregates::rebuild`] folds a whole log; folding the same laps in the same order through
//! either path gives identical values, including the insertion order of driver and kart lists.
//! Maps are `BTreeMap`s so two rebuilds of the same log also serialize byte for byte identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{KartKey, LapRecord};

/// Rollup for one composite kart key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct KartAggregate {
    pub kart_key: KartKey,
    /// Display number of the most recent contributing lap.
    #[serde(default)]
    pub kart_number: String,
    #[serde(default)]
    pub track_config_id: Option<String>,
    #[serde(default)]
    pub total_laps: u32,
    #[serde(default)]
    pub best_lap_ms: Option<u32>,
    #[serde(default)]
    pub worst_lap_ms: Option<u32>,
    #[serde(default)]
    pub total_time_ms: u64,
    /// Unique driver names in first-seen order.
    #[serde(default)]
    pub drivers: Vec<String>,
    #[serde(default)]
    pub driver_laps: BTreeMap<String, u32>,
}

impl KartAggregate {
    fn empty(lap: &LapRecord) -> Self {
        Self {
            kart_key: lap.kart_key.clone(),
            kart_number: lap.kart_number.clone(),
            track_config_id: lap.track_config_id.clone(),
            total_laps: 0,
            best_lap_ms: None,
            worst_lap_ms: None,
            total_time_ms: 0,
            drivers: Vec::new(),
            driver_laps: BTreeMap::new(),
        }
    }

    fn fold(&mut self, lap: &LapRecord) {
        self.kart_number.clone_from(&lap.kart_number);
        self.total_laps += 1;
        self.total_time_ms += u64::from(lap.lap_ms);
        self.best_lap_ms = Some(self.best_lap_ms.map_or(lap.lap_ms, |b| b.min(lap.lap_ms)));
        self.worst_lap_ms = Some(self.worst_lap_ms.map_or(lap.lap_ms, |w| w.max(lap.lap_ms)));
        if !self.driver_laps.contains_key(&lap.driver_name) {
            self.drivers.push(lap.driver_name.clone());
        }
        *self.driver_laps.entry(lap.driver_name.clone()).or_insert(0) += 1;
    }

    pub fn average_lap_ms(&self) -> Option<f64> {
        (self.total_laps > 0).then(|| self.total_time_ms as f64 / f64::from(self.total_laps))
    }
}

/// Rollup for one driver name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct DriverAggregate {
    pub driver_name: String,
    #[serde(default)]
    pub total_laps: u32,
    #[serde(default)]
    pub total_time_ms: u64,
    #[serde(default)]
    pub best_lap_ms: Option<u32>,
    /// Karts driven in first-seen order.
    #[serde(default)]
    pub karts: Vec<KartKey>,
    #[serde(default)]
    pub kart_laps: BTreeMap<KartKey, u32>,
}

impl DriverAggregate {
    fn empty(name: &str) -> Self {
        Self {
            driver_name: name.to_string(),
            total_laps: 0,
            total_time_ms: 0,
            best_lap_ms: None,
            karts: Vec::new(),
            kart_laps: BTreeMap::new(),
        }
    }

    fn fold(&mut self, lap: &LapRecord) {
        self.total_laps += 1;
        self.total_time_ms += u64::from(lap.lap_ms);
        self.best_lap_ms = Some(self.best_lap_ms.map_or(lap.lap_ms, |b| b.min(lap.lap_ms)));
        if !self.kart_laps.contains_key(&lap.kart_key) {
            self.karts.push(lap.kart_key.clone());
        }
        *self.kart_laps.entry(lap.kart_key.clone()).or_insert(0) += 1;
    }

    pub fn average_lap_ms(&self) -> Option<f64> {
        (self.total_laps > 0 && self.total_time_ms > 0)
            .then(|| self.total_time_ms as f64 / f64::from(self.total_laps))
    }

    /// Drivers with laps on two or more karts give the strongest kart comparison.
    pub fn is_cross_kart(&self) -> bool {
        self.karts.len() >= 2
    }
}

/// All kart and driver rollups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aggregates {
    pub karts: BTreeMap<KartKey, KartAggregate>,
    pub drivers: BTreeMap<String, DriverAggregate>,
}

impl Aggregates {
    /// Fold one lap in. Laps slower than `max_lap_ms` are skipped; returns whether it counted.
    pub fn apply(&mut self, lap: &LapRecord, max_lap_ms: u32) -> bool {
        if !lap.is_valid(max_lap_ms) {
            return false;
        }
        self.karts
            .entry(lap.kart_key.clone())
            .or_insert_with(|| KartAggregate::empty(lap))
            .fold(lap);
        self.drivers
            .entry(lap.driver_name.clone())
            .or_insert_with(|| DriverAggregate::empty(&lap.driver_name))
            .fold(lap);
        true
    }

    /// Recompute everything from a lap log.
    pub fn rebuild(laps: &[LapRecord], max_lap_ms: u32) -> Self {
        let mut aggregates = Self::default();
        for lap in laps {
            aggregates.apply(lap, max_lap_ms);
        }
        aggregates
    }

    pub fn kart(&self, key: &str) -> Option<&KartAggregate> {
        self.karts.get(key)
    }

    pub fn driver(&self, name: &str) -> Option<&DriverAggregate> {
        self.drivers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lap;
    use proptest::prelude::*;

    #[test]
    fn kart_rollup_tracks_extremes_and_drivers() {
        let laps = vec![
            lap("s1", "7", "Ana", 1, 28_000),
            lap("s1", "7", "Bo", 2, 27_500),
            lap("s1", "7", "Ana", 3, 29_100),
        ];
        let aggregates = Aggregates::rebuild(&laps, 60_000);
        let kart = aggregates.kart("7").unwrap();

        assert_eq!(kart.total_laps, 3);
        assert_eq!(kart.best_lap_ms, Some(27_500));
        assert_eq!(kart.worst_lap_ms, Some(29_100));
        assert_eq!(kart.total_time_ms, 84_600);
        assert_eq!(kart.drivers, vec!["Ana".to_string(), "Bo".to_string()]);
        assert_eq!(kart.driver_laps["Ana"], 2);
        assert_eq!(kart.average_lap_ms(), Some(28_200.0));
    }

    #[test]
    fn driver_rollup_tracks_karts() {
        let laps = vec![
            lap("s1", "7", "Ana", 1, 28_000),
            lap("s2", "9", "Ana", 1, 27_000),
            lap("s2", "9", "Ana", 2, 27_200),
        ];
        let aggregates = Aggregates::rebuild(&laps, 60_000);
        let driver = aggregates.driver("Ana").unwrap();

        assert_eq!(driver.total_laps, 3);
        assert_eq!(driver.best_lap_ms, Some(27_000));
        assert_eq!(driver.karts, vec![KartKey::from("7"), KartKey::from("9")]);
        assert_eq!(driver.kart_laps[&KartKey::from("9")], 2);
        assert!(driver.is_cross_kart());
    }

    #[test]
    fn over_threshold_lap_is_skipped() {
        let mut aggregates = Aggregates::default();
        assert!(!aggregates.apply(&lap("s1", "7", "Ana", 1, 60_001), 60_000));
        assert!(aggregates.karts.is_empty());
        assert!(aggregates.drivers.is_empty());
        assert!(aggregates.apply(&lap("s1", "7", "Ana", 2, 60_000), 60_000));
    }

    fn arb_lap() -> impl Strategy<Value = LapRecord> {
        (
            prop::sample::select(vec!["s1", "s2", "s3"]),
            prop::sample::select(vec!["1", "2", "7", "11"]),
            prop::sample::select(vec!["Ana", "Bo", "Cy", "Di"]),
            1u32..30,
            10_000u32..65_000,
        )
            .prop_map(|(session, kart, driver, number, ms)| lap(session, kart, driver, number, ms))
    }

    proptest! {
        #[test]
        fn incremental_equals_rebuild(laps in prop::collection::vec(arb_lap(), 0..80)) {
            let mut incremental = Aggregates::default();
            for lap in &laps {
                incremental.apply(lap, 60_000);
            }
            prop_assert_eq!(&incremental, &Aggregates::rebuild(&laps, 60_000));
        }

        #[test]
        fn rebuild_is_pure(laps in prop::collection::vec(arb_lap(), 0..80)) {
            let first = Aggregates::rebuild(&laps, 60_000);
            let second = Aggregates::rebuild(&laps, 60_000);
            prop_assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }

        #[test]
        fn aggregates_are_derivable(laps in prop::collection::vec(arb_lap(), 0..80)) {
            let aggregates = Aggregates::rebuild(&laps, 60_000);
            for (key, kart) in &aggregates.karts {
                let expected = laps
                    .iter()
                    .filter(|l| &l.kart_key == key && l.lap_ms <= 60_000)
                    .count() as u32;
                prop_assert_eq!(kart.total_laps, expected);
                prop_assert_eq!(kart.total_laps, kart.driver_laps.values().sum::<u32>());
                let best = kart.best_lap_ms.unwrap();
                prop_assert!(laps.iter().filter(|l| &l.kart_key == key && l.lap_ms <= 60_000).all(|l| best <= l.lap_ms));
            }
            for driver in aggregates.drivers.values() {
                prop_assert_eq!(driver.total_laps, driver.kart_laps.values().sum::<u32>());
            }
            let total: u32 = aggregates.karts.values().map(|k| k.total_laps).sum();
            prop_assert_eq!(total as usize, laps.iter().filter(|l| l.lap_ms <= 60_000).count());
        }
    }
}
