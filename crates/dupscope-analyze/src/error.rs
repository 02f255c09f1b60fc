//! Errors returned while building a duplicate report.

use thiserror::Error;

use dupscope_core::ScanError;
use dupscope_index::IndexError;

/// Errors that stop a report.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Traversal failed and errors were not ignored, or the report was cancelled.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// An index query failed.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}
