//! Error types for traversal and fingerprinting.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while traversing the filesystem.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walker failure that carries no usable `io::Error`.
    #[error("Walk error at {path}: {message}")]
    Walk { path: PathBuf, message: String },

    /// Traversal stopped because cancellation was signalled.
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error only reports a cancelled traversal.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Per-file failure while computing a fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or seeking inside the file failed.
    #[error("failed to hash {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FingerprintError {
    /// Path of the file that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Open { path, .. } | Self::Read { path, .. } => path,
        }
    }

    /// Kind of the underlying I/O error.
    pub fn kind(&self) -> std::io::ErrorKind {
        match self {
            Self::Open { source, .. } | Self::Read { source, .. } => source.kind(),
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal problem skipped under the ignore-errors policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Build a warning from a traversal error.
    pub fn from_error(error: &ScanError) -> Self {
        match error {
            ScanError::PermissionDenied { path } => Self::new(
                path.clone(),
                format!("Permission denied: {}", path.display()),
                WarningKind::PermissionDenied,
            ),
            ScanError::Io { path, source } => {
                Self::new(path.clone(), format!("Read error: {source}"), WarningKind::ReadError)
            }
            ScanError::NotFound { path } | ScanError::Walk { path, .. } => {
                Self::new(path.clone(), error.to_string(), WarningKind::MetadataError)
            }
            other => Self::new(PathBuf::new(), other.to_string(), WarningKind::ReadError),
        }
    }
}
