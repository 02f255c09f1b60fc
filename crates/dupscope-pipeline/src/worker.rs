//! Fingerprint workers.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, never, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dupscope_core::{FingerprintResult, FingerprintTask, HashKey};
use dupscope_scan::{ContentSource, Fingerprinter};

/// Message carried on the result stream.
#[derive(Debug)]
pub(crate) enum Message {
    /// Outcome of one task.
    Result(FingerprintResult),
    /// The traverser finished after handing out `emitted` tasks.
    ProducerDone { emitted: u64 },
}

/// How often an idle worker re-checks the cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(100);

enum Next {
    Task(FingerprintTask),
    Idle,
    TasksClosed,
    PromotionsClosed,
}

/// One fingerprint worker. Owns its [`Fingerprinter`] for the whole run.
pub(crate) struct Worker {
    pub id: usize,
    pub fingerprinter: Fingerprinter,
    pub source: Arc<dyn ContentSource>,
    pub tasks: Receiver<FingerprintTask>,
    pub promotions: Receiver<FingerprintTask>,
    pub results: Sender<Message>,
    pub cancel: CancellationToken,
    pub ignore_errors: bool,
}

impl Worker {
    /// Serve both task lanes until they are closed or the run is cancelled.
    pub fn run(self) -> u64 {
        let Worker {
            id,
            mut fingerprinter,
            source,
            mut tasks,
            mut promotions,
            results,
            cancel,
            ignore_errors,
        } = self;

        let mut tasks_open = true;
        let mut promotions_open = true;
        let mut processed = 0u64;

        while tasks_open || promotions_open {
            if cancel.is_cancelled() {
                break;
            }

            let next = select! {
                recv(promotions) -> msg => msg.map_or(Next::PromotionsClosed, Next::Task),
                recv(tasks) -> msg => msg.map_or(Next::TasksClosed, Next::Task),
                default(CANCEL_POLL) => Next::Idle,
            };

            let task = match next {
                Next::Task(task) => task,
                Next::Idle => continue,
                Next::TasksClosed => {
                    tasks = never();
                    tasks_open = false;
                    continue;
                }
                Next::PromotionsClosed => {
                    promotions = never();
                    promotions_open = false;
                    continue;
                }
            };

            if cancel.is_cancelled() {
                break;
            }

            let result = fingerprint(&mut fingerprinter, source.as_ref(), task);
            // A deleted placeholder is cleaned up by the collector, not fatal.
            let failed = result.error.is_some() && !result.is_vanished();
            if let Some(error) = &result.error {
                if failed {
                    warn!(worker = id, %error, "fingerprint failed");
                } else {
                    debug!(worker = id, %error, "promoted file vanished");
                }
            }

            processed += 1;
            if results.send(Message::Result(result)).is_err() {
                break;
            }
            if failed && !ignore_errors {
                cancel.cancel();
                break;
            }
        }

        debug!(worker = id, processed, "worker finished");
        processed
    }
}

/// Answer one task. Placeholder tasks never touch the file.
pub(crate) fn fingerprint(
    fingerprinter: &mut Fingerprinter,
    source: &dyn ContentSource,
    task: FingerprintTask,
) -> FingerprintResult {
    let size = task.file.size;
    if !task.needs_hash {
        return FingerprintResult::ok(task, HashKey::placeholder(size));
    }

    let path = task.file.path();
    match fingerprinter.fingerprint(source, &path, size) {
        Ok(digest) => FingerprintResult::ok(task, HashKey::new(size, digest)),
        Err(error) => FingerprintResult::failed(task, error),
    }
}
