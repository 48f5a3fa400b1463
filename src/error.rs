//! Error types for lap-timing ingestion and analysis.
//!
//! Only a few failures ever reach callers of the engine. Malformed snapshots, filtered laps and
//! persistence hiccups are classified and logged where they happen; the variants below describe
//! what surfaces from configuration loading, import/export, feed providers and the persistence
//! collaborators themselves.
//!
//! ## Error Categories
//!
//! - **Input Errors**: snapshots missing identity fields
//! - **Parse Errors**: feed frames, replay files or persisted bundles that do not deserialize
//! - **Persistence Errors**: blob store or session history operations that failed
//! - **Configuration Errors**: invalid engine settings
//! - **Feed Errors**: transport-side failures reported by a provider
//!
//! ```rust
//! use pitboard::EngineError;
//!
//! let error = EngineError::persistence_failed("lap_log", "quota exceeded");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    #[error("Snapshot is missing required field '{field}'")]
    MalformedSnapshot { field: &'static str },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Persistence failed for key '{key}': {reason}")]
    Persistence {
        key: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Import rejected: {reason}")]
    Import { reason: String },

    #[error("Feed error: {reason}")]
    Feed {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Session '{session_id}' not found in history")]
    SessionNotFound { session_id: String },
}

impl EngineError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Persistence { .. } => true,
            EngineError::Feed { .. } => true,
            EngineError::File { .. } => true,
            EngineError::MalformedSnapshot { .. } => false,
            EngineError::Parse { .. } => false,
            EngineError::Config { .. } => false,
            EngineError::Import { .. } => false,
            EngineError::SessionNotFound { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            EngineError::MalformedSnapshot { .. } => vec![
                "Check the timing feed delivers kart numbers and driver names",
                "Verify the venue has assigned drivers to every kart",
            ],
            EngineError::Parse { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
                "Re-export the data from a known good backup",
            ],
            EngineError::Persistence { .. } => vec![
                "Free storage space or raise the storage quota",
                "Check the storage location is writable",
                "Export the lap log as a manual backup",
            ],
            EngineError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
                "Ensure sufficient disk space",
            ],
            EngineError::Config { .. } => vec![
                "Check configuration values are positive and ordered",
                "Remove the setting to fall back to its default",
            ],
            EngineError::Import { .. } => vec![
                "Verify the document was produced by an export",
                "Check the document contains a 'laps' array",
            ],
            EngineError::Feed { .. } => vec![
                "Check the timing feed is reachable",
                "Verify the venue feed is broadcasting",
                "Restart the connection",
            ],
            EngineError::SessionNotFound { .. } => {
                vec!["List stored sessions to find a valid identifier"]
            }
        }
    }

    /// Helper constructor for snapshots missing an identity field.
    pub fn malformed(field: &'static str) -> Self {
        EngineError::MalformedSnapshot { field }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        EngineError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for persistence errors.
    pub fn persistence_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Persistence { key: key.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for persistence errors with source.
    pub fn persistence_failed_with_source(
        key: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        EngineError::Persistence { key: key.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        EngineError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        EngineError::Config { reason: reason.into() }
    }

    /// Helper constructor for feed errors.
    pub fn feed_failed(reason: impl Into<String>) -> Self {
        EngineError::Feed { reason: reason.into(), source: None }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Parse { context: "JSON".to_string(), details: err.to_string() }
    }
}
