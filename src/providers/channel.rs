//! Channel-fed provider for push transports

use tokio::sync::mpsc;

use crate::Result;
use crate::provider::FeedProvider;
use crate::types::SnapshotBatch;

/// Provider fed through an mpsc channel.
///
/// A socket or polling task owns the sender and pushes decoded batches; the feed ends when
/// every sender is dropped.
pub struct ChannelProvider {
    rx: mpsc::Receiver<SnapshotBatch>,
    name: String,
}

impl ChannelProvider {
    /// Create a provider and the sender that feeds it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<SnapshotBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { rx, name: "channel".to_string() }, tx)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait::async_trait]
impl FeedProvider for ChannelProvider {
    async fn next_batch(&mut self) -> Result<Option<SnapshotBatch>> {
        Ok(self.rx.recv().await)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
