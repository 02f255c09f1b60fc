//! Core types and configuration for dupscope.
//!
//! This crate provides the data model shared by the scanner, the persistent
//! index, the indexing pipeline and the duplicate reporter: file descriptors,
//! fingerprint keys, index records, statistics counters and configuration.

mod config;
mod error;
mod model;
mod settings;
mod stats;

pub use config::{
    DEFAULT_QUICK_WINDOW, DEFAULT_WORKERS, HashMode, IndexConfig, IndexConfigBuilder,
    ReportConfig, ReportConfigBuilder,
};
pub use error::{FingerprintError, ScanError, ScanWarning, WarningKind};
pub use model::{
    FileDescriptor, FingerprintResult, FingerprintTask, HashKey, IndexRecord, MAX_DIGEST_LEN,
    PLACEHOLDER_DIGEST,
};
pub use settings::{APP_DIR, INDEX_FILE, Settings, app_dir, default_index_path};
pub use stats::Stats;
