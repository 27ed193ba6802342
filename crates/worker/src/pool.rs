//! Dispatch queue and the semaphore-bounded worker pool.
//!
//! Dispatch is delivery of a job id onto a bounded in-process queue; the
//! pool consumes it and runs one processing task per job, at most
//! `concurrency` at a time. Delivery is at-least-once - the same id can
//! be enqueued twice under dispatcher retries - and the processor's
//! claim check is what keeps double-delivery harmless.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use atelier_core::types::DbId;

use crate::processor::Processor;

/// Default bound of the dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of concurrently processing jobs. Long-running video
/// jobs hold a slot for their entire poll duration.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Why a trigger delivery failed. Both cases are retryable from the
/// dispatcher's point of view.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("dispatch queue is full")]
    Full,
    #[error("dispatch queue is closed")]
    Closed,
}

/// The delivery half of dispatch: hand a job id to whatever runs it.
#[async_trait::async_trait]
pub trait JobTrigger: Send + Sync {
    async fn trigger(&self, job_id: DbId) -> Result<(), TriggerError>;
}

/// Create the dispatch queue. The [`QueueTrigger`] goes to the
/// dispatcher, the receiver to [`WorkerPool::run`].
pub fn job_queue(capacity: usize) -> (QueueTrigger, mpsc::Receiver<DbId>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (QueueTrigger { sender }, receiver)
}

/// [`JobTrigger`] backed by the bounded in-process queue.
#[derive(Clone)]
pub struct QueueTrigger {
    sender: mpsc::Sender<DbId>,
}

#[async_trait::async_trait]
impl JobTrigger for QueueTrigger {
    async fn trigger(&self, job_id: DbId) -> Result<(), TriggerError> {
        self.sender.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TriggerError::Full,
            mpsc::error::TrySendError::Closed(_) => TriggerError::Closed,
        })
    }
}

/// Consumes the dispatch queue and processes jobs concurrently.
pub struct WorkerPool {
    processor: Arc<Processor>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(processor: Arc<Processor>, concurrency: usize) -> Self {
        Self {
            processor,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until the cancellation token fires or the queue closes.
    ///
    /// A panicking processing task is caught and recorded as a `Failed`
    /// transition - a panic must not leave a job silently `Processing`.
    pub async fn run(self, mut receiver: mpsc::Receiver<DbId>, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        tracing::info!(concurrency = self.concurrency, "Worker pool started");

        loop {
            let job_id = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                received = receiver.recv() => match received {
                    Some(id) => id,
                    None => {
                        tracing::info!("Dispatch queue closed, worker pool stopping");
                        break;
                    }
                }
            };

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let processor = Arc::clone(&self.processor);
            tokio::spawn(async move {
                let result = AssertUnwindSafe(processor.process_job(job_id))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(Ok(status)) => {
                        tracing::debug!(job_id, status = status.as_str(), "Job settled");
                    }
                    Ok(Err(e)) => {
                        // process_job already recorded the failure where
                        // it could; this is the store-unreachable path.
                        tracing::error!(job_id, error = %e, "Job processing errored");
                    }
                    Err(_) => {
                        tracing::error!(job_id, "Job processing panicked");
                        if let Err(e) = processor
                            .fail_job(job_id, "worker panicked during processing")
                            .await
                        {
                            tracing::error!(job_id, error = %e, "Failed to record panic failure");
                        }
                    }
                }
                drop(permit);
            });
        }
    }
}
