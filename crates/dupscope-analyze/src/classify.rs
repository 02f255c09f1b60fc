//! Per-file duplicate classification against the index.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, Serializer};

use dupscope_core::FileDescriptor;
use dupscope_index::{IndexError, IndexStore};

/// How a file relates to the rest of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    /// No other indexed file shares this file's key.
    Unique,
    /// Other indexed files share this file's key.
    Duplicate {
        /// Paths of the other files, ordered by folder then name.
        #[serde(serialize_with = "lossy_paths")]
        others: Vec<PathBuf>,
    },
    /// Empty files are never compared.
    IgnoredZeroSize,
    /// The file has no index record.
    IgnoredNotIndexed,
}

impl Classification {
    /// Whether the file has at least one duplicate.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Whether the file was left out of comparison.
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::IgnoredZeroSize | Self::IgnoredNotIndexed)
    }

    /// Short status label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unique => "NOT DUPLICATE",
            Self::Duplicate { .. } => "DUPLICATE OF",
            Self::IgnoredZeroSize => "ZERO SIZE",
            Self::IgnoredNotIndexed => "FILE NOT IN INDEX",
        }
    }
}

/// Serializes a path that may not be UTF-8, replacing invalid sequences.
pub(crate) fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

fn lossy_paths<S: Serializer>(paths: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(paths.iter().map(|path| path.to_string_lossy()))
}

/// Classifies walked files using their stored index records.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    store: &'a IndexStore,
}

impl<'a> Classifier<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Classify `file`.
    ///
    /// Grouping uses the key stored in the index, not a fresh digest. A record
    /// still holding the placeholder was the only indexed file of its size.
    pub fn classify(&self, file: &FileDescriptor) -> Result<Classification, IndexError> {
        if file.size == 0 {
            return Ok(Classification::IgnoredZeroSize);
        }

        let Some(record) = self.store.record_by_folder_filename(&file.folder, &file.name)? else {
            return Ok(Classification::IgnoredNotIndexed);
        };
        if record.key.is_placeholder() {
            return Ok(Classification::Unique);
        }

        let others: Vec<PathBuf> = self
            .store
            .records_by_hash_and_size(&record.key.digest, record.key.size)?
            .into_iter()
            .filter(|other| !other.is_same_file(&file.folder, &file.name))
            .map(|other| other.path())
            .collect();

        if others.is_empty() {
            Ok(Classification::Unique)
        } else {
            Ok(Classification::Duplicate { others })
        }
    }
}
