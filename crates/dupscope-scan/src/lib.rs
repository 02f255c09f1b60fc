//! Filesystem traversal and content fingerprinting for dupscope.
//!
//! # Overview
//!
//! `dupscope-scan` provides the two leaf components of the indexing pipeline:
//!
//! - **[`Walker`]** - deterministic traversal via jwalk that emits every
//!   regular file of a directory before entering its subdirectories
//! - **[`Fingerprinter`]** - BLAKE3 digests over the whole content or over a
//!   bounded head + tail window
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use dupscope_scan::{Fingerprinter, FsSource, HashMode, WalkOptions, Walker};
//!
//! let walker = Walker::new(WalkOptions { recurse: true, ignore_errors: false });
//! let files = walker.collect(&[PathBuf::from("/path/to/scan")]).unwrap();
//!
//! let mut fingerprinter = Fingerprinter::new(HashMode::Quick, 2 * 1024 * 1024);
//! for file in &files {
//!     let digest = fingerprinter.fingerprint(&FsSource, &file.path(), file.size).unwrap();
//!     println!("{digest}  {}", file.path().display());
//! }
//! ```

mod fingerprint;
mod walker;

pub use fingerprint::{ContentSource, Fingerprinter, FsSource, ReadSeek, SMALL_FILE_FACTOR};
pub use walker::{WalkOptions, WalkSummary, Walker};

// Re-export core types for convenience
pub use dupscope_core::{FileDescriptor, FingerprintError, HashMode, ScanError, ScanWarning};
