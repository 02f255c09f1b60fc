//! Concurrent indexing pipeline for dupscope.
//!
//! An indexing run wires three stages together with bounded channels:
//!
//! - a **traverser** thread that walks the roots and decides, per file,
//!   whether a real digest is needed yet (the first file of any size only
//!   gets a placeholder)
//! - N **fingerprint workers**, each owning one [`Fingerprinter`](dupscope_scan::Fingerprinter)
//! - a single **collector** that writes every result to the index and, as
//!   soon as a size is shared by two records, re-enqueues the placeholder
//!   records of that size for hashing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dupscope_core::IndexConfig;
//! use dupscope_index::IndexStore;
//! use dupscope_pipeline::Indexer;
//!
//! let store = Arc::new(IndexStore::open_default().unwrap());
//! let summary = Indexer::new(IndexConfig::new(["/data"]), store).run().unwrap();
//! println!("{} files indexed", summary.files_indexed);
//! ```

mod collector;
mod error;
mod indexer;
mod progress;
mod worker;

pub use error::PipelineError;
pub use indexer::Indexer;
pub use progress::{IndexProgress, IndexSummary, PROGRESS_INTERVAL};
