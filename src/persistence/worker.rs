//! Background persistence task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{BlobSessionHistory, BlobStore, SessionHistory};
use crate::Result;
use crate::session::CompletedSession;

const MAX_ATTEMPTS: u32 = 3;

enum PersistCommand {
    SaveBlob { key: String, bytes: Vec<u8> },
    SaveSession(Box<CompletedSession>),
    Flush(oneshot::Sender<()>),
}

/// Cheap, cloneable sender into the persistence task.
///
/// Every method returns immediately; writes happen on the worker. A `false` return means the
/// worker has stopped and the write was dropped.
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceHandle {
    pub fn save_blob(&self, key: impl Into<String>, bytes: Vec<u8>) -> bool {
        self.tx.send(PersistCommand::SaveBlob { key: key.into(), bytes }).is_ok()
    }

    pub fn save_completed_session(&self, session: CompletedSession) -> bool {
        self.tx.send(PersistCommand::SaveSession(Box::new(session))).is_ok()
    }

    /// Wait until every command sent before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Owns the storage collaborators on a spawned task.
pub struct PersistenceWorker;

impl PersistenceWorker {
    /// Spawn the worker. It runs until every [`PersistenceHandle`] is dropped.
    pub fn spawn(blobs: Arc<dyn BlobStore>, history: Arc<dyn SessionHistory>) -> PersistenceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            Self::run(blobs, history, rx).await;
        });
        PersistenceHandle { tx }
    }

    /// Spawn a worker whose session history lives in the same blob store.
    pub fn spawn_with_store(blobs: Arc<dyn BlobStore>) -> PersistenceHandle {
        let history = Arc::new(BlobSessionHistory::new(blobs.clone()));
        Self::spawn(blobs, history)
    }

    async fn run(
        blobs: Arc<dyn BlobStore>,
        history: Arc<dyn SessionHistory>,
        mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    ) {
        info!("Persistence worker started");
        let mut writes = 0u64;
        let mut failures = 0u64;

        while let Some(command) = rx.recv().await {
            let (what, result) = match command {
                PersistCommand::SaveBlob { key, bytes } => {
                    let result = with_retry(|| blobs.save(&key, &bytes)).await;
                    (key, result)
                }
                PersistCommand::SaveSession(session) => {
                    let result = with_retry(|| history.save_completed_session(&session)).await;
                    (format!("session {}", session.session_id), result)
                }
                PersistCommand::Flush(done) => {
                    let _ = done.send(());
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    writes += 1;
                    debug!(target_key = %what, "Persisted");
                }
                Err(e) => {
                    failures += 1;
                    warn!(target_key = %what, error = %e, suggestions = ?e.recovery_suggestions(), "Persistence failed");
                }
            }
        }

        info!(writes, failures, "Persistence worker ended");
    }
}

async fn with_retry<F, Fut>(mut operation: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                // Exponential backoff: 50ms, 100ms, ...
                let backoff = Duration::from_millis(50 * (1 << (attempt - 1)));
                debug!(attempt, error = %e, "Retrying persistence write");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
