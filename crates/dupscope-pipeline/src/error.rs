//! Errors returned by an indexing run.

use thiserror::Error;

use dupscope_core::{FingerprintError, ScanError};
use dupscope_index::IndexError;

/// First fatal failure of an indexing run.
///
/// Returned by [`Indexer::run`](crate::Indexer::run) only after every thread
/// of the run has been joined.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration was rejected before any thread started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Traversal failed or the run was cancelled.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A file could not be fingerprinted and errors were not ignored.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// The index rejected a write or a query.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// A pipeline thread could not be started.
    #[error("Failed to start thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("Pipeline thread {0} panicked")]
    WorkerPanicked(String),
}

impl PipelineError {
    /// Whether the run stopped only because it was cancelled.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Scan(ScanError::Interrupted))
    }

    pub(crate) fn from_config(error: ScanError) -> Self {
        match error {
            ScanError::InvalidConfig { message } => Self::InvalidConfig(message),
            other => Self::Scan(other),
        }
    }
}
