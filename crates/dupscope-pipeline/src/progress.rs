//! Indexing progress and final summary.

use std::time::{Duration, Instant};

use dupscope_core::ScanWarning;

/// Minimum time between two progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Progress information during an indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexProgress {
    /// Files handed to the workers by the traverser, once known.
    pub files_discovered: Option<u64>,
    /// Files written to the index.
    pub files_indexed: u64,
    /// Bytes of the files written to the index.
    pub bytes_indexed: u64,
    /// Real digests computed, promotions included.
    pub hashed: u64,
    /// Placeholder records re-enqueued for hashing.
    pub promotions: u64,
    /// Files that could not be fingerprinted.
    pub errors: u64,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
}

impl IndexProgress {
    /// Indexing rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        rate(self.files_indexed, self.elapsed)
    }

    /// Indexing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        rate(self.bytes_indexed, self.elapsed)
    }
}

/// Outcome of a completed indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    /// Files written to the index.
    pub files_indexed: u64,
    /// Bytes of the files written to the index.
    pub bytes_indexed: u64,
    /// Real digests computed, promotions included.
    pub hashed: u64,
    /// Placeholder records re-enqueued for hashing.
    pub promotions: u64,
    /// Files skipped because they could not be fingerprinted.
    pub errors: u64,
    /// Traversal problems skipped under the ignore-errors policy.
    pub warnings: Vec<ScanWarning>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl IndexSummary {
    /// Average throughput over the whole run.
    pub fn bytes_per_second(&self) -> f64 {
        rate(self.bytes_indexed, self.elapsed)
    }

    /// Average file rate over the whole run.
    pub fn files_per_second(&self) -> f64 {
        rate(self.files_indexed, self.elapsed)
    }
}

fn rate(amount: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        amount as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Counters kept by the collector, with report throttling.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    last_report: Instant,
    interval: Duration,
    current: IndexProgress,
}

impl ProgressTracker {
    pub fn new(start_time: Instant, interval: Duration) -> Self {
        Self {
            start_time,
            last_report: start_time,
            interval,
            current: IndexProgress::default(),
        }
    }

    pub fn record_indexed(&mut self, size: u64, hashed: bool) {
        self.current.files_indexed += 1;
        self.current.bytes_indexed += size;
        if hashed {
            self.current.hashed += 1;
        }
    }

    pub fn record_promoted(&mut self) {
        self.current.hashed += 1;
    }

    pub fn record_promotions_issued(&mut self, count: u64) {
        self.current.promotions += count;
    }

    pub fn record_error(&mut self) {
        self.current.errors += 1;
    }

    pub fn set_discovered(&mut self, files: u64) {
        self.current.files_discovered = Some(files);
    }

    /// Whether a report is due; resets the interval when it is.
    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.interval {
            self.last_report = now;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> IndexProgress {
        IndexProgress {
            elapsed: self.start_time.elapsed(),
            ..self.current.clone()
        }
    }
}
