//! Connection to a timing feed
//!
//! [`TimingConnection`] ties a [`FeedProvider`] to a shared [`LapEngine`]: the driver task
//! ingests every batch, subscribers receive [`IngestReport`]s at the rate they ask for, and
//! queries go through [`TimingConnection::engine`].

use futures::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Result;
use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::engine::{IngestReport, LapEngine, SharedEngine};
use crate::provider::FeedProvider;
use crate::providers::ReplayProvider;
use crate::stream::ThrottleExt;
use crate::types::UpdateRate;


/// A running feed connection.
pub struct TimingConnection {
    reports: watch::Receiver<Option<Arc<IngestReport>>>,
    engine: SharedEngine,
    source: String,
    cancel: CancellationToken,
}

impl TimingConnection {
    /// Start ingesting from `provider` into a new engine.
    pub fn start<P: FeedProvider>(provider: P, engine: LapEngine) -> Self {
        Self::start_shared(provider, engine.into_shared())
    }

    /// Start ingesting from `provider` into an engine that is already shared.
    pub fn start_shared<P: FeedProvider>(provider: P, engine: SharedEngine) -> Self {
        let source = provider.name().to_string();
        let channels = Driver::spawn(provider, engine.clone());
        info!(source = %source, "Timing connection started");
        Self { reports: channels.reports, engine, source, cancel: channels.cancel }
    }

    /// Replay a recorded feed at `speed` into a fresh engine.
    pub async fn replay<P: AsRef<Path>>(path: P, config: EngineConfig, speed: f64) -> Result<Self> {
        config.validate()?;
        let mut provider = ReplayProvider::open(path).await?;
        provider.set_speed(speed);
        Ok(Self::start(provider, LapEngine::new(config)))
    }

    /// Subscribe to ingest reports.
    ///
    /// Reports are published latest-wins: a subscriber that falls behind sees the newest report,
    /// not every one. The stream ends after the last report once the feed ends or the connection
    /// closes.
    pub fn subscribe(&self, rate: UpdateRate) -> impl Stream<Item = Arc<IngestReport>> + 'static {
        let mut receiver = self.reports.clone();
        receiver.mark_unchanged();
        let reports = WatchStream::from_changes(receiver).filter_map(|opt| async move { opt });

        match rate.throttle_interval() {
            None => reports.boxed(),
            Some(period) => reports.throttle(period).boxed(),
        }
    }

    /// The most recent ingest report, if any.
    pub fn latest_report(&self) -> Option<Arc<IngestReport>> {
        self.reports.borrow().clone()
    }

    /// Shared handle for queries. Holding the lock pauses ingestion.
    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Provider name.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stop the ingest task.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TimingConnection {
    fn drop(&mut self) {
        debug!(source = %self.source, "Dropping timing connection");
        self.cancel.cancel();
    }
}
