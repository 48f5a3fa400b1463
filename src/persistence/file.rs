//! File-backed blob store: one file per key under a root directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::BlobStore;
use crate::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a key.
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are percent-encoded (`%` included), so distinct keys never
    /// share a file.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                name.push(char::from(byte));
            } else {
                name.push('%');
                name.push_str(&hex::encode_upper([byte]));
            }
        }
        self.root.join(format!("{name}.blob"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        let mut path = self.path_for(key).into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }
}

#[async_trait::async_trait]
impl BlobStore for FileBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::file_error(path, e)),
        }
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| EngineError::file_error(self.root.clone(), e))?;

        // Write to a sibling temp file, then rename over the target.
        let path = self.path_for(key);
        let temp_path = self.temp_path_for(key);
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|e| EngineError::file_error(temp_path.clone(), e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| EngineError::file_error(path.clone(), e))?;

        debug!(key, bytes = bytes.len(), path = %path.display(), "Blob saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::file_error(path, e)),
        }
    }
}
