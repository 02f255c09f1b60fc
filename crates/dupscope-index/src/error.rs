//! Error types for the persistent index.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`IndexStore`](crate::IndexStore) operations.
///
/// Every index error is fatal for the caller: a failed write has already been
/// rolled back when the error is returned.
#[derive(Debug, Error)]
pub enum IndexError {
    /// SQLite failure, including busy timeouts and constraint violations.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Digest longer than the schema allows.
    #[error("Digest of {len} characters exceeds the maximum of {max}")]
    HashTooLong { len: usize, max: usize },

    /// Update or removal of a file that is not indexed.
    #[error("No index record for {}", folder.join(name).display())]
    NotFound { folder: PathBuf, name: OsString },

    /// Size that cannot be stored as a signed 64-bit integer.
    #[error("File size {size} does not fit the index")]
    SizeOutOfRange { size: u64 },

    /// Failure preparing the index location.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The platform reports no user configuration directory.
    #[error("No configuration directory available for the index")]
    NoConfigDir,
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
