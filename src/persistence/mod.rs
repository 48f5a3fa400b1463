//! Persistence collaborators: blob storage, completed-session history and the background worker
//!
//! Ingestion never waits on storage. The engine hands serialized blobs to a
//! [`PersistenceHandle`], and a [`PersistenceWorker`] task writes them through a [`BlobStore`].

mod file;
mod history;
mod memory;
mod worker;

pub use file::FileBlobStore;
pub use history::{BlobSessionHistory, SessionHistory, SessionSummary};
pub use memory::MemoryBlobStore;
pub use worker::{PersistenceHandle, PersistenceWorker};

use crate::Result;

/// Engine configuration, as YAML.
pub const SETTINGS_KEY: &str = "settings";
/// The lap store bundle: laps, aggregates and session records.
pub const LAP_LOG_KEY: &str = "lap_log";
pub const PERSONAL_BESTS_KEY: &str = "personal_bests";
/// Summaries of every completed session in history.
pub const SESSION_INDEX_KEY: &str = "sessions:index";

/// Key of one completed session.
pub fn session_blob_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Key-value blob storage.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Load a blob; `Ok(None)` when the key was never written.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`.
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove a blob; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait::async_trait]
impl<T> BlobStore for std::sync::Arc<T>
where
    T: BlobStore + ?Sized,
{
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }
}
