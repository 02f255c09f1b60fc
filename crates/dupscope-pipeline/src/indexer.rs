//! Indexing run orchestration: one traverser, N workers, one collector.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;

use crossbeam_channel::{Sender, bounded, unbounded};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use dupscope_core::{FingerprintTask, IndexConfig, ScanError};
use dupscope_index::IndexStore;
use dupscope_scan::{ContentSource, Fingerprinter, FsSource, WalkOptions, WalkSummary, Walker};

use crate::collector::{Collector, CollectorOutcome};
use crate::error::PipelineError;
use crate::progress::{IndexProgress, IndexSummary};
use crate::worker::{Message, Worker};

/// Builds or refreshes the index for a set of roots.
///
/// The traverser thread decides which files need a real digest, the workers
/// compute fingerprints and the collector is the only thread that writes to
/// the [`IndexStore`].
pub struct Indexer {
    config: IndexConfig,
    store: Arc<IndexStore>,
    source: Arc<dyn ContentSource>,
    cancel: CancellationToken,
    progress_tx: broadcast::Sender<IndexProgress>,
}

impl Indexer {
    /// Create an indexer reading file content from the local filesystem.
    pub fn new(config: IndexConfig, store: Arc<IndexStore>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            store,
            source: Arc::new(FsSource),
            cancel: CancellationToken::new(),
            progress_tx,
        }
    }

    /// Read file content through `source` instead of the filesystem.
    pub fn with_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.source = source;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexProgress> {
        self.progress_tx.subscribe()
    }

    /// Token that stops the run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion.
    ///
    /// Returns the first fatal error once every thread has been joined.
    /// Cancellation, from the token or from a fatal error, stops all stages
    /// at their next check; a cancelled run reports
    /// [`ScanError::Interrupted`].
    pub fn run(&self) -> Result<IndexSummary, PipelineError> {
        self.config.validate().map_err(PipelineError::from_config)?;

        let started = Instant::now();
        let depth = self.config.queue_depth();
        info!(
            roots = ?self.config.roots,
            workers = self.config.workers,
            mode = %self.config.hash_mode,
            "indexing started"
        );

        let (scan, outcome) = thread::scope(|scope| self.run_stages(scope, depth, started))?;

        let warnings = match scan {
            Ok(summary) => summary.warnings,
            Err(err) if err.is_interrupted() => Vec::new(),
            Err(err) => return Err(PipelineError::Scan(err)),
        };
        if let Some(err) = outcome.first_error {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Scan(ScanError::Interrupted));
        }

        let progress = outcome.progress;
        let summary = IndexSummary {
            files_indexed: progress.files_indexed,
            bytes_indexed: progress.bytes_indexed,
            hashed: progress.hashed,
            promotions: progress.promotions,
            errors: progress.errors,
            warnings,
            elapsed: started.elapsed(),
        };
        info!(
            files = summary.files_indexed,
            bytes = summary.bytes_indexed,
            hashed = summary.hashed,
            promotions = summary.promotions,
            errors = summary.errors,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "indexing finished"
        );
        Ok(summary)
    }

    fn run_stages<'scope, 'env>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        depth: usize,
        started: Instant,
    ) -> Result<(Result<WalkSummary, ScanError>, CollectorOutcome), PipelineError>
    {
        let (task_tx, task_rx) = bounded::<FingerprintTask>(depth);
        let (result_tx, result_rx) = bounded::<Message>(depth);
        let (promotion_tx, promotion_rx) = unbounded::<FingerprintTask>();

        let collector = Collector::new(
            Arc::clone(&self.store),
            promotion_tx,
            self.progress_tx.clone(),
            self.cancel.clone(),
            self.config.ignore_errors,
            started,
        );
        let collector_handle =
            self.spawn(scope, "dupscope-collector".into(), move || collector.run(result_rx))?;

        let mut worker_handles = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                fingerprinter: Fingerprinter::new(self.config.hash_mode, self.config.quick_window),
                source: Arc::clone(&self.source),
                tasks: task_rx.clone(),
                promotions: promotion_rx.clone(),
                results: result_tx.clone(),
                cancel: self.cancel.clone(),
                ignore_errors: self.config.ignore_errors,
            };
            let handle = self.spawn(scope, format!("dupscope-worker-{id}"), move || worker.run())?;
            worker_handles.push(handle);
        }
        drop(task_rx);
        drop(promotion_rx);

        let producer_handle = self.spawn(scope, "dupscope-walker".into(), move || {
            self.produce(task_tx, result_tx)
        })?;

        // Without a walker nobody reports the emitted count, so stop the rest.
        let scan = join(producer_handle, "walker").inspect_err(|_| self.cancel.cancel())?;
        let mut panicked = None;
        for (id, handle) in worker_handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = id, "worker panicked");
                panicked = Some(format!("dupscope-worker-{id}"));
            }
        }
        let outcome = join(collector_handle, "collector")?;
        if let Some(name) = panicked {
            return Err(PipelineError::WorkerPanicked(name));
        }
        Ok((scan, outcome))
    }

    /// Traverse the roots and hand out one task per non-empty file.
    ///
    /// The first file of each size gets a placeholder task; later files of
    /// the same size get a hashing task.
    fn produce(
        &self,
        tasks: Sender<FingerprintTask>,
        results: Sender<Message>,
    ) -> Result<WalkSummary, ScanError> {
        let walker = Walker::new(WalkOptions {
            recurse: self.config.recurse,
            ignore_errors: self.config.ignore_errors,
        });

        let mut sizes: HashMap<u64, u64> = HashMap::new();
        let mut emitted = 0u64;
        let outcome = walker.walk(&self.config.roots, &self.cancel, |file| {
            if file.size == 0 {
                debug!(path = %file.path().display(), "skipping empty file");
                return ControlFlow::Continue(());
            }

            let seen = sizes.entry(file.size).or_insert(0);
            *seen += 1;
            let needs_hash = *seen > 1;
            if tasks.send(FingerprintTask::discovered(file, needs_hash)).is_err() {
                return ControlFlow::Break(());
            }
            emitted += 1;
            ControlFlow::Continue(())
        });
        drop(tasks);

        match &outcome {
            Ok(summary) => debug!(
                files = summary.files,
                dirs = summary.dirs,
                warnings = summary.warnings.len(),
                "traversal complete"
            ),
            Err(err) if err.is_interrupted() => debug!(emitted, "traversal interrupted"),
            Err(err) => {
                error!(error = %err, "traversal failed, stopping");
                self.cancel.cancel();
            }
        }

        // The collector may already be gone after a panic.
        let _ = results.send(Message::ProducerDone { emitted });
        outcome
    }

    fn spawn<'scope, 'env, T, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        name: String,
        f: F,
    ) -> Result<ScopedJoinHandle<'scope, T>, PipelineError>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        thread::Builder::new()
            .name(name.clone())
            .spawn_scoped(scope, f)
            .map_err(|source| {
                // Stages already running exit once their lanes close.
                self.cancel.cancel();
                PipelineError::Spawn { name, source }
            })
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, T>, stage: &str) -> Result<T, PipelineError> {
    handle.join().map_err(|_| {
        error!(stage, "pipeline thread panicked");
        PipelineError::WorkerPanicked(stage.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<IndexStore>) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(temp.path().join("db/index.db")).unwrap());
        (temp, store)
    }

    #[test]
    fn test_zero_workers_rejected_before_start() {
        let (temp, store) = setup();
        let mut config = IndexConfig::new([temp.path()]);
        config.workers = 0;

        let err = Indexer::new(config, Arc::clone(&store)).run().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert_eq!(store.count_files().unwrap(), 0);
    }

    #[test]
    fn test_empty_files_not_indexed() {
        let (temp, store) = setup();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("empty"), "").unwrap();
        fs::write(data.join("full"), "content").unwrap();

        let summary = Indexer::new(IndexConfig::new([&data]), Arc::clone(&store))
            .run()
            .unwrap();
        assert_eq!(summary.files_indexed, 1);
        assert_eq!(store.count_files().unwrap(), 1);
    }

    #[test]
    fn test_pre_cancelled_run_is_interrupted() {
        let (temp, store) = setup();
        fs::write(temp.path().join("a"), "a").unwrap();

        let indexer = Indexer::new(IndexConfig::new([temp.path()]), store);
        indexer.cancel_token().cancel();
        assert!(indexer.run().unwrap_err().is_interrupted());
    }
}
