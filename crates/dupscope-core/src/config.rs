//! Indexing and reporting configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ScanError;

/// Default number of fingerprint workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Default quick-hash sampling window (head + tail), in bytes.
pub const DEFAULT_QUICK_WINDOW: u64 = 2 * 1024 * 1024;

/// Digest algorithm used for a whole indexing run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HashMode {
    /// Hash a bounded head + tail window.
    #[default]
    Quick,
    /// Hash the complete content.
    Full,
}

/// Configuration for an indexing run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct IndexConfig {
    /// Root paths to traverse.
    pub roots: Vec<PathBuf>,

    /// Descend into subdirectories.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub recurse: bool,

    /// Log and skip unreadable entries instead of aborting.
    #[builder(default = "false")]
    #[serde(default)]
    pub ignore_errors: bool,

    /// Number of fingerprint workers (at least 1).
    #[builder(default = "DEFAULT_WORKERS")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Quick or full hashing.
    #[builder(default)]
    #[serde(default)]
    pub hash_mode: HashMode,

    /// Sampling window for quick hashing.
    #[builder(default = "DEFAULT_QUICK_WINDOW")]
    #[serde(default = "default_quick_window")]
    pub quick_window: u64,

    /// Queue slots per worker for the task and result streams.
    #[builder(default = "2")]
    #[serde(default = "default_queue_factor")]
    pub queue_depth_factor: usize,
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_quick_window() -> u64 {
    DEFAULT_QUICK_WINDOW
}

fn default_queue_factor() -> usize {
    2
}

impl IndexConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => return Err("At least one root is required".into()),
            None => return Err("At least one root is required".into()),
            _ => {}
        }
        if let Some(workers) = self.workers {
            if workers < 1 {
                return Err(format!("Worker count must be at least 1, got {workers}"));
            }
        }
        if self.quick_window == Some(0) {
            return Err("Quick hash window must be greater than 0".into());
        }
        if self.queue_depth_factor == Some(0) {
            return Err("Queue depth factor must be greater than 0".into());
        }
        Ok(())
    }
}

impl IndexConfig {
    /// Create a new config builder.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Create a recursive quick-hash config for the given roots.
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            recurse: true,
            ignore_errors: false,
            workers: DEFAULT_WORKERS,
            hash_mode: HashMode::Quick,
            quick_window: DEFAULT_QUICK_WINDOW,
            queue_depth_factor: 2,
        }
    }

    /// Re-check the invariants enforced by the builder.
    ///
    /// Fields are public, so the pipeline calls this before starting threads.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: String| Err(ScanError::InvalidConfig { message });
        if self.roots.is_empty() {
            return invalid("At least one root is required".into());
        }
        if self.workers < 1 {
            return invalid(format!("Worker count must be at least 1, got {}", self.workers));
        }
        if self.quick_window == 0 {
            return invalid("Quick hash window must be greater than 0".into());
        }
        if self.queue_depth_factor == 0 {
            return invalid("Queue depth factor must be greater than 0".into());
        }
        Ok(())
    }

    /// Capacity of the bounded task and result streams.
    pub fn queue_depth(&self) -> usize {
        self.workers.max(1) * self.queue_depth_factor.max(1)
    }
}

/// Configuration for a duplicate report.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ReportConfig {
    /// Root paths to report on.
    pub roots: Vec<PathBuf>,

    /// Descend into subdirectories.
    #[builder(default = "false")]
    #[serde(default)]
    pub recurse: bool,

    /// Log and skip unreadable entries instead of aborting.
    #[builder(default = "false")]
    #[serde(default)]
    pub ignore_errors: bool,

    /// Minimum duplicate percentage (count or bytes) for a folder to be shown.
    #[builder(default = "0.0")]
    #[serde(default)]
    pub min_dir_percent: f64,

    /// Minimum duplicate bytes for a folder to be shown.
    #[builder(default = "0")]
    #[serde(default)]
    pub min_dir_bytes: u64,

    /// Files smaller than this are not listed (statistics are unaffected).
    #[builder(default = "0")]
    #[serde(default)]
    pub min_file_size: u64,

    /// List only duplicate files (statistics are unaffected).
    #[builder(default = "false")]
    #[serde(default)]
    pub duplicates_only: bool,
}

impl ReportConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if !roots.is_empty() => {}
            _ => return Err("At least one root is required".into()),
        }
        if let Some(percent) = self.min_dir_percent {
            if !(0.0..=100.0).contains(&percent) {
                return Err(format!("Folder percentage must be within 0..=100, got {percent}"));
            }
        }
        Ok(())
    }
}

impl ReportConfig {
    /// Create a new config builder.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Create a non-recursive report config with no thresholds.
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            recurse: false,
            ignore_errors: false,
            min_dir_percent: 0.0,
            min_dir_bytes: 0,
            min_file_size: 0,
            duplicates_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_config_builder() {
        let config = IndexConfig::builder()
            .roots(vec![PathBuf::from("/home/user")])
            .workers(8usize)
            .hash_mode(HashMode::Full)
            .build()
            .unwrap();

        assert_eq!(config.roots, vec![PathBuf::from("/home/user")]);
        assert_eq!(config.workers, 8);
        assert_eq!(config.hash_mode, HashMode::Full);
        assert!(config.recurse);
        assert_eq!(config.queue_depth(), 16);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = IndexConfig::builder()
            .roots(vec![PathBuf::from("/tmp")])
            .workers(0usize)
            .build();
        assert!(result.is_err());

        let mut config = IndexConfig::new(["/tmp"]);
        config.workers = 0;
        assert!(matches!(config.validate(), Err(ScanError::InvalidConfig { .. })));
    }

    #[test]
    fn test_roots_required() {
        assert!(IndexConfig::builder().build().is_err());
        assert!(ReportConfig::builder().roots(Vec::<PathBuf>::new()).build().is_err());
    }

    #[test]
    fn test_hash_mode_parse() {
        assert_eq!("full".parse::<HashMode>().unwrap(), HashMode::Full);
        assert_eq!(HashMode::Quick.to_string(), "quick");
    }

    #[test]
    fn test_report_config_defaults() {
        let config = ReportConfig::builder().roots(vec![PathBuf::from(".")]).build().unwrap();
        assert!(!config.recurse);
        assert_eq!(config.min_dir_percent, 0.0);
        assert_eq!(config.min_dir_bytes, 0);
    }
}
