//! Incident detection
//!
//! A lap is an incident when it is materially slower than the kart's own baseline pace in the
//! same session *and* the kart recovers afterwards. A driver who is simply slow for several laps
//! in a row does not recover and is not flagged.
//!
//! Each session window is analyzed on its own:
//!
//! 1. The session's opening lap (lap number 1) and laps outside the valid window are excluded.
//!    "First lap" means the standing start, not whichever lap happens to open the window: the
//!    per-kart view is capped, so a window can start mid-session, and dropping its first entry
//!    would discard a racing lap. A three-lap window that includes the standing start therefore
//!    leaves only two analyzed laps, whose median sits halfway between them; the end-of-window
//!    exception only confirms a slow last lap when the laps before it set the pace.
//! 2. The baseline is the trimmed mean of the remaining laps, or their median when the window is
//!    too short for trimming to drop anything.
//! 3. Laps above `baseline * candidate_ratio` are candidates; above `baseline * severe_ratio`
//!    they are severe.
//! 4. A candidate is confirmed when the next lap is faster than `candidate * recovery_ratio`,
//!    or when it is the last lap of the window.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::stats::{median_sorted, trimmed_mean_sorted};
use crate::config::IncidentPolicy;
use crate::types::{KartKey, LapRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum BaselineMethod {
    TrimmedMean,
    Median,
}

/// Baseline pace of one session window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Baseline {
    pub session_id: String,
    pub baseline_ms: f64,
    pub method: BaselineMethod,
    pub median_ms: f64,
    pub min_ms: u32,
    pub max_ms: u32,
    pub analyzed_laps: usize,
}

/// One confirmed incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct IncidentDetail {
    pub session_id: String,
    pub lap_number: u32,
    pub driver_name: String,
    pub lap_ms: u32,
    pub baseline_ms: f64,
    /// Time lost against the baseline.
    pub delta_ms: f64,
    pub percent_over_baseline: f64,
    /// 1 (minor) to 5 (major).
    pub severity: u8,
    pub severe: bool,
    pub recovery_lap: Option<u32>,
    pub recovery_ms: Option<u32>,
}

/// Incident summary for one kart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct KartIncidentReport {
    pub kart_key: KartKey,
    pub analyzed_laps: usize,
    pub total_incidents: usize,
    pub severe_incidents: usize,
    pub minor_incidents: usize,
    /// Incidents as a percentage of analyzed laps.
    pub incident_rate: f64,
    pub total_time_lost_ms: f64,
    pub avg_time_lost_ms: f64,
    pub baselines: Vec<Baseline>,
    pub incidents: Vec<IncidentDetail>,
}

/// Result of incident analysis; short histories are reported rather than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum IncidentAnalysis {
    InsufficientData { kart_key: KartKey, laps_available: usize },
    Analyzed(KartIncidentReport),
}

/// Severity on a 1-5 scale from the lap/baseline ratio.
pub fn severity(ratio: f64) -> u8 {
    if ratio >= 2.0 {
        5
    } else if ratio >= 1.7 {
        4
    } else if ratio >= 1.5 {
        3
    } else if ratio >= 1.4 {
        2
    } else {
        1
    }
}

fn in_window(lap: &LapRecord, policy: &IncidentPolicy) -> bool {
    lap.lap_number > 1 && (policy.min_valid_lap_ms..=policy.max_valid_lap_ms).contains(&lap.lap_ms)
}

/// Baseline over the analyzable laps of one window.
pub fn baseline(session_id: &str, laps: &[&LapRecord], policy: &IncidentPolicy) -> Option<Baseline> {
    let mut sorted: Vec<f64> = laps.iter().map(|lap| f64::from(lap.lap_ms)).collect();
    sorted.sort_by(f64::total_cmp);

    let median_ms = median_sorted(&sorted)?;
    let (baseline_ms, method) = match trimmed_mean_sorted(&sorted, policy.trim_fraction) {
        Some(trimmed) => (trimmed, BaselineMethod::TrimmedMean),
        None => (median_ms, BaselineMethod::Median),
    };

    Some(Baseline {
        session_id: session_id.to_string(),
        baseline_ms,
        method,
        median_ms,
        min_ms: laps.iter().map(|lap| lap.lap_ms).min()?,
        max_ms: laps.iter().map(|lap| lap.lap_ms).max()?,
        analyzed_laps: laps.len(),
    })
}

/// Analyze one chronological session window.
pub fn analyze_window(
    session_id: &str,
    window: &[&LapRecord],
    policy: &IncidentPolicy,
) -> Option<(Baseline, Vec<IncidentDetail>)> {
    if window.len() < policy.min_window_laps {
        return None;
    }

    let analyzed: Vec<&LapRecord> = window.iter().copied().filter(|lap| in_window(lap, policy)).collect();
    let baseline = baseline(session_id, &analyzed, policy)?;
    let base = baseline.baseline_ms;

    let mut incidents = Vec::new();
    for (position, lap) in window.iter().enumerate() {
        if !in_window(lap, policy) {
            continue;
        }
        let lap_ms = f64::from(lap.lap_ms);
        if lap_ms <= base * policy.candidate_ratio {
            continue;
        }

        let next = window.get(position + 1);
        let recovered = next.is_none_or(|next| f64::from(next.lap_ms) < lap_ms * policy.recovery_ratio);
        if !recovered {
            trace!(lap = lap.lap_number, ms = lap.lap_ms, "Slow lap without recovery");
            continue;
        }

        let ratio = lap_ms / base;
        incidents.push(IncidentDetail {
            session_id: session_id.to_string(),
            lap_number: lap.lap_number,
            driver_name: lap.driver_name.clone(),
            lap_ms: lap.lap_ms,
            baseline_ms: base,
            delta_ms: lap_ms - base,
            percent_over_baseline: (ratio - 1.0) * 100.0,
            severity: severity(ratio),
            severe: lap_ms > base * policy.severe_ratio,
            recovery_lap: next.map(|next| next.lap_number),
            recovery_ms: next.map(|next| next.lap_ms),
        });
    }

    Some((baseline, incidents))
}

/// Analyze a kart's chronological laps, one window per session.
pub fn detect_incidents<'a, I>(kart_key: &KartKey, laps: I, policy: &IncidentPolicy) -> IncidentAnalysis
where
    I: IntoIterator<Item = &'a LapRecord>,
{
    // Sessions in order of first appearance.
    let mut windows: Vec<(&str, Vec<&LapRecord>)> = Vec::new();
    let mut laps_available = 0;
    for lap in laps {
        laps_available += 1;
        match windows.iter_mut().find(|(id, _)| *id == lap.session_id) {
            Some((_, window)) => window.push(lap),
            None => windows.push((lap.session_id.as_str(), vec![lap])),
        }
    }

    let mut baselines = Vec::new();
    let mut incidents = Vec::new();
    for (session_id, window) in &windows {
        if let Some((baseline, found)) = analyze_window(session_id, window, policy) {
            baselines.push(baseline);
            incidents.extend(found);
        }
    }

    if baselines.is_empty() {
        return IncidentAnalysis::InsufficientData { kart_key: kart_key.clone(), laps_available };
    }

    let analyzed_laps: usize = baselines.iter().map(|b| b.analyzed_laps).sum();
    let severe_incidents = incidents.iter().filter(|i| i.severe).count();
    let total_time_lost_ms: f64 = incidents.iter().map(|i| i.delta_ms).sum();
    let total_incidents = incidents.len();

    IncidentAnalysis::Analyzed(KartIncidentReport {
        kart_key: kart_key.clone(),
        analyzed_laps,
        total_incidents,
        severe_incidents,
        minor_incidents: total_incidents - severe_incidents,
        incident_rate: total_incidents as f64 / analyzed_laps as f64 * 100.0,
        total_time_lost_ms,
        avg_time_lost_ms: if total_incidents > 0 {
            total_time_lost_ms / total_incidents as f64
        } else {
            0.0
        },
        baselines,
        incidents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lap;

    fn window(first_lap: u32, times: &[u32]) -> Vec<LapRecord> {
        times
            .iter()
            .enumerate()
            .map(|(i, ms)| lap("s1", "7", "Ana", first_lap + i as u32, *ms))
            .collect()
    }

    fn report(laps: &[LapRecord]) -> KartIncidentReport {
        match detect_incidents(&KartKey::from("7"), laps, &IncidentPolicy::default()) {
            IncidentAnalysis::Analyzed(report) => report,
            other => panic!("expected a report, got {other:?}"),
        }
    }

    #[test]
    fn slow_lap_with_recovery_is_confirmed() {
        let report = report(&window(2, &[30_000, 30_000, 45_000, 30_200]));
        assert_eq!(report.total_incidents, 1);
        let incident = &report.incidents[0];
        assert_eq!(incident.lap_number, 4);
        assert_eq!(incident.recovery_lap, Some(5));
        assert_eq!(incident.recovery_ms, Some(30_200));
        assert_eq!(incident.severity, 2);
        assert!(!incident.severe);
        assert!((incident.baseline_ms - 30_100.0).abs() < 1e-9);
    }

    #[test]
    fn last_lap_needs_no_recovery() {
        let report = report(&window(5, &[30_000, 30_000, 45_000]));
        assert_eq!(report.total_incidents, 1);
        assert_eq!(report.incidents[0].lap_number, 7);
        assert_eq!(report.incidents[0].recovery_lap, None);
        assert_eq!(report.incidents[0].severity, 3);
        assert_eq!(report.analyzed_laps, 3);
    }

    #[test]
    fn opening_lap_is_excluded() {
        // Lap 1 is a slow standing start and must not become an incident or skew the baseline.
        let report = report(&window(1, &[50_000, 30_000, 30_000, 30_100]));
        assert_eq!(report.total_incidents, 0);
        assert_eq!(report.analyzed_laps, 3);
        assert_eq!(report.baselines[0].min_ms, 30_000);
    }

    #[test]
    fn standing_start_counts_toward_the_window_but_not_the_baseline() {
        // Numbered from the standing start, only laps 2 and 3 are analyzed.
        let from_start = report(&window(1, &[30_000, 30_000, 45_000]));
        assert_eq!(from_start.total_incidents, 0);
        assert_eq!(from_start.analyzed_laps, 2);
        assert_eq!(from_start.baselines[0].method, BaselineMethod::Median);
        assert!((from_start.baselines[0].baseline_ms - 37_500.0).abs() < 1e-9);

        // The same times after the standing start confirm the last lap.
        let mid_session = report(&window(2, &[30_000, 30_000, 45_000]));
        assert_eq!(mid_session.total_incidents, 1);
        assert_eq!(mid_session.incidents[0].lap_number, 4);
    }

    #[test]
    fn without_recovery_slow_lap_is_not_confirmed() {
        let report = report(&window(2, &[30_000, 30_000, 30_000, 45_000, 52_000, 30_000]));
        assert_eq!(report.total_incidents, 1);
        let incident = &report.incidents[0];
        assert_eq!(incident.lap_ms, 52_000);
        assert_eq!(incident.severity, 4);
        assert!(incident.severe);
        assert_eq!(report.severe_incidents, 1);
        assert_eq!(report.minor_incidents, 0);
    }

    #[test]
    fn trimmed_mean_for_long_windows() {
        let mut times = vec![30_000; 11];
        times[5] = 70_000; // outside the valid window, ignored
        times[7] = 41_000;
        let report = report(&window(2, &times));
        assert_eq!(report.baselines[0].method, BaselineMethod::TrimmedMean);
        assert_eq!(report.analyzed_laps, 10);
        assert_eq!(report.total_incidents, 1);
        assert_eq!(report.incidents[0].lap_ms, 41_000);
        assert!((report.incident_rate - 10.0).abs() < 1e-9);
        assert!((report.total_time_lost_ms - 11_000.0).abs() < 1e-9);
    }

    #[test]
    fn sessions_are_separate_windows() {
        let mut laps = window(2, &[30_000, 30_000, 30_000]);
        laps.extend(
            [40_000, 40_000, 40_000].iter().enumerate().map(|(i, ms)| lap("s2", "7", "Bo", 2 + i as u32, *ms)),
        );
        let report = report(&laps);
        // 40 s is normal pace for the second session, not an incident.
        assert_eq!(report.baselines.len(), 2);
        assert_eq!(report.total_incidents, 0);
    }

    #[test]
    fn short_history_is_insufficient() {
        let laps = window(2, &[30_000, 31_000]);
        let analysis = detect_incidents(&KartKey::from("7"), &laps, &IncidentPolicy::default());
        assert_eq!(
            analysis,
            IncidentAnalysis::InsufficientData { kart_key: KartKey::from("7"), laps_available: 2 }
        );
    }

    #[test]
    fn severity_scale() {
        assert_eq!(severity(2.1), 5);
        assert_eq!(severity(1.7), 4);
        assert_eq!(severity(1.55), 3);
        assert_eq!(severity(1.45), 2);
        assert_eq!(severity(1.31), 1);
    }
}
