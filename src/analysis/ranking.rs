//! Driver-normalized kart ranking
//!
//! Raw lap times say as much about who drove a kart as about the kart. Each lap is therefore
//! divided by its driver's own average pace; a kart whose laps sit below its drivers' averages
//! is intrinsically fast. Drivers who have used two or more karts are the cleanest signal, so
//! their ratios get extra weight once there are enough of them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use super::stats::{mean, std_dev};
use crate::config::RankingPolicy;
use crate::store::{Aggregates, LapStore};
use crate::types::{KartKey, LapRecord};

/// Driver-normalized performance index for one kart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct NormalizedIndex {
    /// Mean lap/driver-average ratio; below 1.0 means faster than the drivers' usual pace.
    pub index: f64,
    /// `(1 - index) * 100`.
    pub percentage_faster: f64,
    pub laps_used: usize,
    pub cross_kart_laps: usize,
    /// Whether cross-kart ratios were blended in.
    pub blended: bool,
}

/// Per-lap percentile within each lap's own session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct PercentileStats {
    pub avg_percentile: f64,
    pub best_percentile: f64,
    pub worst_percentile: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// How much the ranking of a kart can be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Confidence {
    pub score: u32,
    pub level: ConfidenceLevel,
    /// `100 - coefficient of variation` of the kart's lap times.
    pub consistency: f64,
}

/// One ranked kart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct KartRanking {
    pub rank: usize,
    pub kart_key: KartKey,
    pub kart_number: String,
    pub total_laps: usize,
    pub average_lap_ms: f64,
    pub best_lap_ms: u32,
    pub driver_count: usize,
    pub cross_kart_drivers: usize,
    pub normalized: NormalizedIndex,
    pub percentile: Option<PercentileStats>,
    pub confidence: Confidence,
}

fn qualifying<'a>(
    laps: &'a [LapRecord],
    kart_key: &'a str,
    track: Option<&'a str>,
    max_lap_ms: u32,
) -> impl Iterator<Item = &'a LapRecord> + 'a {
    laps.iter().filter(move |lap| {
        lap.kart_key.as_str() == kart_key && lap.is_valid(max_lap_ms) && lap.on_track(track)
    })
}

/// Compute the normalized index of one kart, or `None` when no lap qualifies.
pub fn normalized_index(
    laps: &[LapRecord],
    aggregates: &Aggregates,
    kart_key: &str,
    track: Option<&str>,
    max_lap_ms: u32,
    policy: &RankingPolicy,
) -> Option<NormalizedIndex> {
    let mut all = Vec::new();
    let mut cross_kart = Vec::new();

    for lap in qualifying(laps, kart_key, track, max_lap_ms) {
        let Some(driver) = aggregates.driver(&lap.driver_name) else { continue };
        let Some(average) = driver.average_lap_ms() else { continue };
        let ratio = f64::from(lap.lap_ms) / average;
        all.push(ratio);
        if driver.is_cross_kart() {
            cross_kart.push(ratio);
        }
    }

    let all_mean = mean(&all)?;
    let blended = cross_kart.len() >= policy.min_cross_kart_laps;
    let index = match mean(&cross_kart) {
        Some(cross_mean) if blended => {
            policy.cross_kart_weight * cross_mean + (1.0 - policy.cross_kart_weight) * all_mean
        }
        _ => all_mean,
    };

    Some(NormalizedIndex {
        index,
        percentage_faster: (1.0 - index) * 100.0,
        laps_used: all.len(),
        cross_kart_laps: cross_kart.len(),
        blended,
    })
}

/// Percentile of each of the kart's laps against its session, in percent.
pub fn percentile_stats(
    laps: &[LapRecord],
    kart_key: &str,
    track: Option<&str>,
    max_lap_ms: u32,
) -> Option<PercentileStats> {
    let mut by_session: HashMap<&str, Vec<u32>> = HashMap::new();
    for lap in laps.iter().filter(|lap| lap.is_valid(max_lap_ms)) {
        by_session.entry(lap.session_id.as_str()).or_default().push(lap.lap_ms);
    }

    let percentiles: Vec<f64> = qualifying(laps, kart_key, track, max_lap_ms)
        .filter_map(|lap| {
            let session = by_session.get(lap.session_id.as_str())?;
            let slower = session.iter().filter(|ms| **ms > lap.lap_ms).count();
            Some(slower as f64 / session.len() as f64 * 100.0)
        })
        .collect();

    Some(PercentileStats {
        avg_percentile: mean(&percentiles)?,
        best_percentile: percentiles.iter().copied().fold(f64::MIN, f64::max),
        worst_percentile: percentiles.iter().copied().fold(f64::MAX, f64::min),
    })
}

/// Additive 0-100 confidence score from four independent signals.
pub fn confidence(
    lap_count: usize,
    driver_count: usize,
    cross_kart_drivers: usize,
    lap_times_ms: &[f64],
) -> Confidence {
    let lap_points = match lap_count {
        50.. => 30,
        20.. => 20,
        10.. => 10,
        _ => 5,
    };
    let driver_points = match driver_count {
        5.. => 30,
        3.. => 20,
        2 => 10,
        _ => 5,
    };
    let cross_kart_points = match cross_kart_drivers {
        3.. => 20,
        2 => 15,
        1 => 10,
        _ => 0,
    };

    let consistency = match (mean(lap_times_ms), std_dev(lap_times_ms)) {
        (Some(mean), Some(std_dev)) if mean > 0.0 => 100.0 - std_dev / mean * 100.0,
        _ => 0.0,
    };
    let consistency_points = if consistency >= 95.0 {
        20
    } else if consistency >= 90.0 {
        15
    } else if consistency >= 85.0 {
        10
    } else {
        5
    };

    let score = lap_points + driver_points + cross_kart_points + consistency_points;
    let level = match score {
        70.. => ConfidenceLevel::High,
        40.. => ConfidenceLevel::Medium,
        _ => ConfidenceLevel::Low,
    };
    Confidence { score, level, consistency }
}

fn banded(a: f64, b: f64, band: f64) -> Ordering {
    if (a - b).abs() <= band { Ordering::Equal } else { a.total_cmp(&b) }
}

fn ranking_order(a: &KartRanking, b: &KartRanking, band: f64) -> Ordering {
    banded(a.average_lap_ms, b.average_lap_ms, band)
        .then_with(|| banded(f64::from(a.best_lap_ms), f64::from(b.best_lap_ms), band))
        .then_with(|| b.total_laps.cmp(&a.total_laps))
        .then_with(|| b.confidence.score.cmp(&a.confidence.score))
}

/// Stable insertion sort; tie bands are not transitive, which `sort_by` requires.
fn sort_rankings(rankings: &mut [KartRanking], band: f64) {
    for i in 1..rankings.len() {
        let mut j = i;
        while j > 0 && ranking_order(&rankings[j - 1], &rankings[j], band) == Ordering::Greater {
            rankings.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Rank every kart with at least one qualifying lap, optionally on one track configuration.
pub fn rank_karts(store: &LapStore, track: Option<&str>, policy: &RankingPolicy) -> Vec<KartRanking> {
    let laps = store.laps();
    let aggregates = store.aggregates();
    let max_lap_ms = store.max_lap_ms();

    let mut rankings: Vec<KartRanking> = aggregates
        .karts
        .values()
        .filter_map(|kart| {
            let key = kart.kart_key.as_str();
            let kart_laps: Vec<&LapRecord> = qualifying(laps, key, track, max_lap_ms).collect();
            let normalized = normalized_index(laps, aggregates, key, track, max_lap_ms, policy)?;

            let times: Vec<f64> = kart_laps.iter().map(|lap| f64::from(lap.lap_ms)).collect();
            let drivers: BTreeSet<&str> =
                kart_laps.iter().map(|lap| lap.driver_name.as_str()).collect();
            let cross_kart_drivers = drivers
                .iter()
                .filter(|name| aggregates.driver(name).is_some_and(|d| d.is_cross_kart()))
                .count();

            Some(KartRanking {
                rank: 0,
                kart_key: kart.kart_key.clone(),
                kart_number: kart.kart_number.clone(),
                total_laps: kart_laps.len(),
                average_lap_ms: mean(&times)?,
                best_lap_ms: kart_laps.iter().map(|lap| lap.lap_ms).min()?,
                driver_count: drivers.len(),
                cross_kart_drivers,
                percentile: percentile_stats(laps, key, track, max_lap_ms),
                confidence: confidence(kart_laps.len(), drivers.len(), cross_kart_drivers, &times),
                normalized,
            })
        })
        .collect();

    sort_rankings(&mut rankings, policy.tie_band_ms);
    for (position, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = position + 1;
    }
    rankings
}
