//! Persistent fingerprint index for dupscope.
//!
//! The index maps every indexed file, keyed by (folder, filename), to its
//! size and content digest. Files that were never compared against another
//! file of the same size carry the empty placeholder digest.
//!
//! # Example
//!
//! ```rust,no_run
//! use dupscope_core::HashKey;
//! use dupscope_index::IndexStore;
//!
//! let store = IndexStore::open("/tmp/dupscope/index.db").unwrap();
//! store.upsert("/data", "a.bin", &HashKey::new(4, "0f1e")).unwrap();
//! for record in store.records_by_hash_and_size("0f1e", 4).unwrap() {
//!     println!("{}", record.path().display());
//! }
//! ```

mod error;
mod sql;
mod store;

pub use error::{IndexError, IndexResult};
pub use store::{DEFAULT_BUSY_TIMEOUT, DEFAULT_MMAP_SIZE, IndexStore, StoreOptions};
