//! Driver spawns and manages the ingestion task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::engine::{IngestReport, SharedEngine};
use crate::provider::FeedProvider;

/// Consecutive provider failures tolerated before the driver gives up.
pub const MAX_PROVIDER_ERRORS: u32 = 10;

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Receiver for the latest ingest report; `None` until the first batch.
    ///
    /// The sender is dropped when the task exits, so the last report stays readable and
    /// `changed()` fails once it has been seen.
    pub reports: watch::Receiver<Option<Arc<IngestReport>>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages the ingestion task
///
/// The task owns the provider and is the only writer to the engine, which keeps ingestion on a
/// single logical timeline. Queries take the same lock between batches.
pub struct Driver;

impl Driver {
    /// Spawn the ingestion task for the given provider
    pub fn spawn<P>(provider: P, engine: SharedEngine) -> DriverChannels
    where
        P: FeedProvider,
    {
        let (report_tx, report_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        tokio::spawn(async move {
            Self::ingest_task(provider, engine, report_tx, cancel_task).await;
        });

        DriverChannels { reports: report_rx, cancel }
    }

    async fn ingest_task<P>(
        mut provider: P,
        engine: SharedEngine,
        report_tx: watch::Sender<Option<Arc<IngestReport>>>,
        cancel: CancellationToken,
    ) where
        P: FeedProvider,
    {
        info!(provider = provider.name(), "Ingest task started");
        let mut batch_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingest task cancelled");
                    break;
                }
                result = provider.next_batch() => result,
            };

            match result {
                Ok(Some(batch)) => {
                    batch_count += 1;
                    error_count = 0;
                    trace!(batch = batch_count, karts = batch.karts.len(), "Batch received");

                    let report = engine.lock().await.ingest(&batch);
                    if !report.events.is_empty() || report.reset.is_some() {
                        debug!(
                            batch = batch_count,
                            events = report.events.len(),
                            appended = report.appended.len(),
                            rejected = report.rejected.len(),
                            "Batch ingested"
                        );
                    }

                    // A dropped receiver only means nobody is listening; ingestion continues.
                    let _ = report_tx.send(Some(Arc::new(report)));
                }
                Ok(None) => {
                    info!(batches = batch_count, "Feed ended");
                    let mut engine = engine.lock().await;
                    engine.end_session();
                    engine.persist();
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!(
                        "Provider error ({}/{}): {}",
                        error_count, MAX_PROVIDER_ERRORS, e
                    );

                    if error_count >= MAX_PROVIDER_ERRORS {
                        error!("Too many provider errors, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        // Dropping the sender is the end-of-feed signal.
        drop(report_tx);
        info!(batches = batch_count, "Ingest task ended");
    }
}
