use std::path::PathBuf;

use thiserror::Error;

use crate::version::RangeError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found upstream: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to write download: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single (package, spec) node was not imported
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid version range: {0}")]
    RangeParse(#[from] RangeError),

    #[error("Not found upstream: {0}")]
    UpstreamNotFound(String),

    #[error("Upstream registry error: {0}")]
    Upstream(RegistryError),

    #[error("{file} had an invalid sha1: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Artifact storage error at {path:?}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid upstream metadata: {0}")]
    InvalidMetadata(String),

    #[error("Dependency depth limit of {0} exceeded")]
    DepthExceeded(usize),
}

impl From<RegistryError> for ImportError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(what) => ImportError::UpstreamNotFound(what),
            other => ImportError::Upstream(other),
        }
    }
}
