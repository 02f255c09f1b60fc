//! Duplication counters for a folder or a whole report.

use serde::{Deserialize, Serialize};

/// Running counters for one reporting scope.
///
/// Every file counted lands in `file_count` and `total_bytes`; duplicates and
/// ignored files are additionally tracked in their own counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of files seen.
    pub file_count: u64,
    /// Number of files with at least one duplicate.
    pub duplicate_count: u64,
    /// Bytes held by duplicate files.
    pub duplicate_bytes: u64,
    /// Number of ignored files (zero-size or not indexed).
    pub ignored_count: u64,
    /// Bytes held by ignored files.
    pub ignored_bytes: u64,
    /// Bytes of every file seen.
    pub total_bytes: u64,
}

impl Stats {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file without duplicates.
    pub fn add_unique(&mut self, size: u64) {
        self.file_count += 1;
        self.total_bytes += size;
    }

    /// Record a duplicate file.
    pub fn add_duplicate(&mut self, size: u64) {
        self.add_unique(size);
        self.duplicate_count += 1;
        self.duplicate_bytes += size;
    }

    /// Record an ignored file.
    pub fn add_ignored(&mut self, size: u64) {
        self.add_unique(size);
        self.ignored_count += 1;
        self.ignored_bytes += size;
    }

    /// Fold another scope's counters into this one.
    pub fn merge(&mut self, other: &Stats) {
        self.file_count += other.file_count;
        self.duplicate_count += other.duplicate_count;
        self.duplicate_bytes += other.duplicate_bytes;
        self.ignored_count += other.ignored_count;
        self.ignored_bytes += other.ignored_bytes;
        self.total_bytes += other.total_bytes;
    }

    /// Files that took part in comparison.
    pub fn compared_count(&self) -> u64 {
        self.file_count - self.ignored_count
    }

    /// Bytes that took part in comparison.
    pub fn compared_bytes(&self) -> u64 {
        self.total_bytes - self.ignored_bytes
    }

    /// Percentage of compared files that are duplicates.
    ///
    /// Returns `None` when no file was compared.
    pub fn duplicate_percentage(&self) -> Option<f64> {
        percentage(self.duplicate_count, self.compared_count())
    }

    /// Percentage of compared bytes held by duplicates.
    ///
    /// Returns `None` when no byte was compared.
    pub fn duplicate_byte_percentage(&self) -> Option<f64> {
        percentage(self.duplicate_bytes, self.compared_bytes())
    }

    /// Whether nothing has been counted.
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

fn percentage(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| 100.0 * part as f64 / whole as f64)
}
