//! On-demand analysis over the lap log: kart ranking and incident detection.
//!
//! Both analyses read the store and never mutate it. Results that cannot be computed are
//! explicit: unrankable karts are left out of [`rank_karts`], and short histories come back as
//! [`IncidentAnalysis::InsufficientData`].

mod incident;
mod ranking;
pub mod stats;

pub use incident::{
    Baseline, BaselineMethod, IncidentAnalysis, IncidentDetail, KartIncidentReport,
    analyze_window, detect_incidents, severity,
};
pub use ranking::{
    Confidence, ConfidenceLevel, KartRanking, NormalizedIndex, PercentileStats, confidence,
    normalized_index, percentile_stats, rank_karts,
};
