//! Completed-session history

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{BlobStore, SESSION_INDEX_KEY, session_blob_key};
use crate::session::CompletedSession;
use crate::{EngineError, Result};

/// Index entry for one completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub session_key: String,
    pub track_config_id: Option<String>,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub kart_count: usize,
    pub winner_kart_number: Option<String>,
    pub restart_suspected: bool,
}

impl From<&CompletedSession> for SessionSummary {
    fn from(session: &CompletedSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            session_key: session.session_key.clone(),
            track_config_id: session.track_config_id.clone(),
            started_at_ms: session.started_at_ms,
            ended_at_ms: session.ended_at_ms,
            kart_count: session.results.len(),
            winner_kart_number: session.winner.as_ref().map(|w| w.kart_number.clone()),
            restart_suspected: session.restart_suspected,
        }
    }
}

/// Storage for completed sessions.
#[async_trait::async_trait]
pub trait SessionHistory: Send + Sync + 'static {
    async fn save_completed_session(&self, session: &CompletedSession) -> Result<()>;

    async fn load_session(&self, session_id: &str) -> Result<CompletedSession>;

    /// Summaries, most recently ended first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Returns whether the session existed.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;
}

/// [`SessionHistory`] over a [`BlobStore`]: one blob per session plus an index blob.
pub struct BlobSessionHistory<B> {
    blobs: B,
    // Serializes read-modify-write of the index.
    index_lock: Mutex<()>,
}

impl<B: BlobStore> BlobSessionHistory<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs, index_lock: Mutex::new(()) }
    }

    async fn read_index(&self) -> Result<Vec<SessionSummary>> {
        match self.blobs.load(SESSION_INDEX_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::parse("Session index", e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, index: &[SessionSummary]) -> Result<()> {
        let bytes = serde_json::to_vec(index)?;
        self.blobs.save(SESSION_INDEX_KEY, &bytes).await
    }
}

#[async_trait::async_trait]
impl<B: BlobStore> SessionHistory for BlobSessionHistory<B> {
    async fn save_completed_session(&self, session: &CompletedSession) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        self.blobs.save(&session_blob_key(&session.session_id), &bytes).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = match self.read_index().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Session index unreadable, starting a new one");
                Vec::new()
            }
        };
        index.retain(|s| s.session_id != session.session_id);
        index.push(SessionSummary::from(session));
        self.write_index(&index).await?;

        debug!(session = %session.session_id, sessions = index.len(), "Completed session saved");
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<CompletedSession> {
        let bytes = self
            .blobs
            .load(&session_blob_key(session_id))
            .await?
            .ok_or_else(|| EngineError::SessionNotFound { session_id: session_id.to_string() })?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::parse("Completed session", e.to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut index = self.read_index().await?;
        index.sort_by(|a, b| b.ended_at_ms.cmp(&a.ended_at_ms).then_with(|| a.session_id.cmp(&b.session_id)));
        Ok(index)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let existed = self.blobs.delete(&session_blob_key(session_id)).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        let before = index.len();
        index.retain(|s| s.session_id != session_id);
        if index.len() != before {
            self.write_index(&index).await?;
        }
        Ok(existed || index.len() != before)
    }
}
