//! File descriptors, fingerprint keys and index records.

use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// Digest value meaning "size currently unique; content not hashed yet".
pub const PLACEHOLDER_DIGEST: &str = "";

/// Maximum digest length accepted by the index (hex BLAKE3).
pub const MAX_DIGEST_LEN: usize = 64;

/// A regular file found during traversal.
///
/// Names are kept as the raw OS string so that files whose names are not
/// valid UTF-8 are reopened and indexed under their exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Absolute folder containing the file.
    pub folder: PathBuf,
    /// File name within `folder`.
    pub name: OsString,
    /// Size in bytes.
    pub size: u64,
}

impl FileDescriptor {
    /// Create a new descriptor.
    pub fn new(folder: impl Into<PathBuf>, name: impl Into<OsString>, size: u64) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            size,
        }
    }

    /// Full path of the file.
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.name)
    }
}

/// Composite identity grouping files: size plus content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashKey {
    /// File size in bytes.
    pub size: u64,
    /// Hex digest, or [`PLACEHOLDER_DIGEST`].
    pub digest: String,
}

impl HashKey {
    /// Create a key with a real digest.
    pub fn new(size: u64, digest: impl Into<String>) -> Self {
        Self {
            size,
            digest: digest.into(),
        }
    }

    /// Create a placeholder key for a size seen only once so far.
    pub fn placeholder(size: u64) -> Self {
        Self {
            size,
            digest: PLACEHOLDER_DIGEST.to_string(),
        }
    }

    /// Whether the digest is the placeholder sentinel.
    pub fn is_placeholder(&self) -> bool {
        self.digest == PLACEHOLDER_DIGEST
    }
}

/// A persisted `(folder, filename) -> HashKey` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Absolute folder.
    pub folder: PathBuf,
    /// File name within the folder.
    pub name: OsString,
    /// Size and digest.
    pub key: HashKey,
}

impl IndexRecord {
    /// Full path of the indexed file.
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.name)
    }

    /// Whether this record refers to the given folder and file name.
    pub fn is_same_file(&self, folder: &Path, name: &OsStr) -> bool {
        self.folder == folder && self.name == name
    }
}

/// Unit of work for a fingerprint worker.
#[derive(Debug, Clone)]
pub struct FingerprintTask {
    /// The file to fingerprint.
    pub file: FileDescriptor,
    /// Whether the real content digest must be computed.
    pub needs_hash: bool,
    /// Whether this recomputes a record that still carries the placeholder.
    pub is_promotion: bool,
}

impl FingerprintTask {
    /// Task emitted by traversal.
    pub fn discovered(file: FileDescriptor, needs_hash: bool) -> Self {
        Self {
            file,
            needs_hash,
            is_promotion: false,
        }
    }

    /// Task re-enqueued to replace a placeholder digest.
    pub fn promotion(record: &IndexRecord) -> Self {
        Self {
            file: FileDescriptor::new(&record.folder, &record.name, record.key.size),
            needs_hash: true,
            is_promotion: true,
        }
    }
}

/// Outcome of one fingerprint task.
#[derive(Debug)]
pub struct FingerprintResult {
    /// Folder of the file.
    pub folder: PathBuf,
    /// File name.
    pub name: OsString,
    /// Computed key (placeholder when no hash was needed).
    pub key: HashKey,
    /// Failure, if the file could not be fingerprinted.
    pub error: Option<FingerprintError>,
    /// Mirrors [`FingerprintTask::is_promotion`].
    pub is_promotion: bool,
}

impl FingerprintResult {
    /// Successful result for `task`.
    pub fn ok(task: FingerprintTask, key: HashKey) -> Self {
        Self {
            folder: task.file.folder,
            name: task.file.name,
            key,
            error: None,
            is_promotion: task.is_promotion,
        }
    }

    /// Failed result for `task`.
    pub fn failed(task: FingerprintTask, error: FingerprintError) -> Self {
        let key = HashKey::placeholder(task.file.size);
        Self {
            folder: task.file.folder,
            name: task.file.name,
            key,
            error: Some(error),
            is_promotion: task.is_promotion,
        }
    }

    /// Full path of the file.
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.name)
    }

    /// Whether this is a promotion whose file no longer exists.
    ///
    /// Placeholders written by an earlier run can outlive their files; such a
    /// record is stale rather than unreadable.
    pub fn is_vanished(&self) -> bool {
        matches!(
            &self.error,
            Some(error @ FingerprintError::Open { .. }) if error.kind() == ErrorKind::NotFound
        ) && self.is_promotion
    }
}
