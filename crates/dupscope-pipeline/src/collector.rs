//! The collector: sole writer of the index during a run.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dupscope_core::{
    FingerprintError, FingerprintResult, FingerprintTask, PLACEHOLDER_DIGEST,
};
use dupscope_index::{IndexError, IndexStore};

use crate::error::PipelineError;
use crate::progress::{IndexProgress, PROGRESS_INTERVAL, ProgressTracker};
use crate::worker::Message;

/// What the collector hands back once the result stream is closed.
#[derive(Debug)]
pub(crate) struct CollectorOutcome {
    pub progress: IndexProgress,
    pub first_error: Option<PipelineError>,
}

/// Applies fingerprint results to the index and schedules promotions.
///
/// Keeps reading until every result sender is gone, so workers never block on
/// a full result stream. The promotion lane is closed once the traverser has
/// finished and every task handed out has been answered, or on cancellation.
pub(crate) struct Collector {
    store: Arc<IndexStore>,
    cancel: CancellationToken,
    ignore_errors: bool,
    promotions: Option<Sender<FingerprintTask>>,
    in_flight: HashSet<(PathBuf, OsString)>,
    failed: HashSet<(PathBuf, OsString)>,
    progress: ProgressTracker,
    progress_tx: broadcast::Sender<IndexProgress>,
    emitted: Option<u64>,
    received: u64,
    issued: u64,
    first_error: Option<PipelineError>,
    halted: bool,
}

impl Collector {
    pub fn new(
        store: Arc<IndexStore>,
        promotions: Sender<FingerprintTask>,
        progress_tx: broadcast::Sender<IndexProgress>,
        cancel: CancellationToken,
        ignore_errors: bool,
        started: Instant,
    ) -> Self {
        Self {
            store,
            cancel,
            ignore_errors,
            promotions: Some(promotions),
            in_flight: HashSet::new(),
            failed: HashSet::new(),
            progress: ProgressTracker::new(started, PROGRESS_INTERVAL),
            progress_tx,
            emitted: None,
            received: 0,
            issued: 0,
            first_error: None,
            halted: false,
        }
    }

    pub fn run(mut self, results: Receiver<Message>) -> CollectorOutcome {
        for message in results.iter() {
            match message {
                Message::ProducerDone { emitted } => {
                    debug!(emitted, "traversal finished");
                    self.emitted = Some(emitted);
                    self.progress.set_discovered(emitted);
                }
                Message::Result(result) => {
                    self.received += 1;
                    self.handle(result);
                }
            }

            if self.promotions.is_some() && (self.cancel.is_cancelled() || self.all_answered()) {
                debug!(issued = self.issued, "closing promotion lane");
                self.promotions = None;
            }

            if self.progress.due() {
                self.publish();
            }
        }

        // Lane may still be open if the stream closed early, e.g. after a panic.
        self.promotions = None;
        let progress = self.publish();
        CollectorOutcome {
            progress,
            first_error: self.first_error,
        }
    }

    fn all_answered(&self) -> bool {
        self.emitted
            .is_some_and(|emitted| self.received == emitted + self.issued)
    }

    fn handle(&mut self, mut result: FingerprintResult) {
        let file = (result.folder.clone(), result.name.clone());
        if result.is_promotion {
            self.in_flight.remove(&file);
        }

        if result.is_vanished() {
            if !self.halted {
                self.forget(&result);
            }
            return;
        }
        if let Some(error) = result.error.take() {
            if result.is_promotion {
                // Never retry an unreadable placeholder within this run.
                self.failed.insert(file);
            }
            self.on_fingerprint_error(error);
            return;
        }
        if self.halted {
            return;
        }

        let written = if result.is_promotion {
            self.apply_promotion(&result.folder, &result)
        } else {
            self.apply_discovery(&result.folder, &result)
        };
        if let Err(err) = written {
            self.halt(err);
        }
    }

    /// Drop the record of a placeholder whose file has been deleted.
    fn forget(&mut self, result: &FingerprintResult) {
        match self.store.remove(&result.folder, &result.name) {
            Ok(()) | Err(IndexError::NotFound { .. }) => {
                info!(path = %result.path().display(), "file vanished, record removed");
            }
            Err(err) => self.halt(err),
        }
    }

    fn apply_discovery(&mut self, folder: &Path, result: &FingerprintResult) -> Result<(), IndexError> {
        let key = &result.key;
        self.store.upsert(folder, &result.name, key)?;
        self.progress.record_indexed(key.size, !key.is_placeholder());

        if self.store.count_by_size(key.size)? >= 2 {
            self.promote_placeholders(key.size)?;
        }
        Ok(())
    }

    fn apply_promotion(&mut self, folder: &Path, result: &FingerprintResult) -> Result<(), IndexError> {
        self.store.update_hash(folder, &result.name, &result.key.digest)?;
        self.progress.record_promoted();
        debug!(path = %result.path().display(), "placeholder promoted");
        Ok(())
    }

    /// Re-enqueue every placeholder of `size` that is not already being hashed.
    fn promote_placeholders(&mut self, size: u64) -> Result<(), IndexError> {
        let Some(promotions) = &self.promotions else {
            return Ok(());
        };

        let mut issued = 0;
        for record in self.store.records_by_hash_and_size(PLACEHOLDER_DIGEST, size)? {
            let key = (record.folder.clone(), record.name.clone());
            if self.in_flight.contains(&key) || self.failed.contains(&key) {
                continue;
            }
            if promotions.send(FingerprintTask::promotion(&record)).is_err() {
                break;
            }
            self.in_flight.insert(key);
            issued += 1;
        }

        self.issued += issued;
        self.progress.record_promotions_issued(issued);
        Ok(())
    }

    fn on_fingerprint_error(&mut self, error: FingerprintError) {
        self.progress.record_error();
        if self.ignore_errors {
            warn!(%error, "skipping file");
            return;
        }

        error!(%error, "fingerprint failed, stopping");
        self.cancel.cancel();
        if self.first_error.is_none() {
            self.first_error = Some(PipelineError::Fingerprint(error));
        }
    }

    /// Index failures are fatal: stop writing but keep draining.
    fn halt(&mut self, err: IndexError) {
        error!(error = %err, "index write failed, stopping");
        self.halted = true;
        self.cancel.cancel();
        if self.first_error.is_none() {
            self.first_error = Some(PipelineError::Index(err));
        }
    }

    fn publish(&mut self) -> IndexProgress {
        let snapshot = self.progress.snapshot();
        info!(
            indexed = snapshot.files_indexed,
            hashed = snapshot.hashed,
            promotions = snapshot.promotions,
            errors = snapshot.errors,
            files_per_sec = snapshot.files_per_second().round(),
            "indexing progress"
        );
        // No subscribers is fine.
        let _ = self.progress_tx.send(snapshot.clone());
        snapshot
    }
}
