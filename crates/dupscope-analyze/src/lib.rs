//! Duplicate classification and per-folder statistics for dupscope.
//!
//! Reporting never hashes anything: every walked file is looked up in the
//! index and grouped with the other records sharing its stored key.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dupscope_analyze::DuplicateReporter;
//! use dupscope_core::ReportConfig;
//! use dupscope_index::IndexStore;
//!
//! let store = Arc::new(IndexStore::open_default().unwrap());
//! let reporter = DuplicateReporter::new(ReportConfig::new(["."]), store);
//! let overall = reporter
//!     .for_each_folder(|folder| {
//!         if folder.visible {
//!             println!("{}: {} duplicates", folder.folder.display(), folder.stats.duplicate_count);
//!         }
//!     })
//!     .unwrap();
//! println!("{} files, {} duplicates", overall.file_count, overall.duplicate_count);
//! ```

mod classify;
mod error;
mod report;

pub use classify::{Classification, Classifier};
pub use error::AnalyzeError;
pub use report::{DuplicateReport, DuplicateReporter, FileReport, FolderReport};

// Re-export core types
pub use dupscope_core::{ReportConfig, Stats};
