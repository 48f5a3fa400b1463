//! Live karting lap-timing engine.
//!
//! Pitboard ingests timing-feed snapshots, turns them into an append-only lap log, keeps kart and
//! driver aggregates that can always be rebuilt from that log, and answers analysis queries over
//! it.
//!
//! # Features
//!
//! - **Lap detection**: one lap event per lap counter increment, idempotent under replay
//! - **Session tracking**: session key changes and venue restarts reset per-session state only
//! - **Rebuildable aggregates**: the incremental path always matches a full rebuild
//! - **Analysis**: driver-normalized kart rankings and per-kart incident detection
//! - **Retention**: oldest sessions are evicted past a cap, rebuilding aggregates atomically
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use pitboard::{EngineConfig, TimingConnection, UpdateRate};
//!
//! #[tokio::main]
//! async fn main() -> pitboard::Result<()> {
//!     let connection =
//!         TimingConnection::replay("heat.jsonl", EngineConfig::default(), 4.0).await?;
//!     let mut reports = connection.subscribe(UpdateRate::Max(2));
//!
//!     while let Some(report) = reports.next().await {
//!         for lap in &report.appended {
//!             println!("{} lap {}: {} ms", lap.kart_number, lap.lap_number, lap.lap_ms);
//!         }
//!     }
//!
//!     let engine = connection.engine();
//!     for kart in engine.lock().await.rank_karts(None) {
//!         println!("#{} kart {}", kart.rank, kart.kart_number);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The engine can also be driven synchronously with [`LapEngine::ingest`] when the caller owns
//! the feed loop.

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Ingestion pipeline
pub mod detector;
pub mod engine;
pub mod normalizer;
pub mod observer;
pub mod session;
pub mod store;

// Analysis
pub mod analysis;

// Persistence collaborators
pub mod persistence;

// Stream-based feed architecture
pub mod connection;
pub mod driver;
pub mod provider;
pub mod providers;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::EngineConfig;
pub use connection::TimingConnection;
pub use engine::{IngestReport, LapEngine, RejectReason, RejectedLap, SharedEngine};
pub use observer::{LapObserver, PersonalBestTracker};
pub use provider::FeedProvider;
pub use session::CompletedSession;
pub use store::LapStore;
