//! Provider trait for timing feed sources

use crate::Result;
use crate::types::SnapshotBatch;

/// Source of snapshot batches.
///
/// Providers abstract over where batches come from (a recorded replay, a socket task, a test
/// harness) and handle their own pacing.
#[async_trait::async_trait]
pub trait FeedProvider: Send + 'static {
    /// Wait for the next batch.
    ///
    /// Returns:
    /// - `Ok(Some(batch))` - a batch arrived
    /// - `Ok(None)` - the feed ended normally
    /// - `Err(e)` - the feed failed; the driver retries with backoff
    async fn next_batch(&mut self) -> Result<Option<SnapshotBatch>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
