//! The async dispatcher: out-of-band trigger with retry and backoff.
//!
//! The request handler must return immediately, so the handoff to the
//! worker pool happens here, off the request path. Trigger delivery can
//! fail (queue full, queue closed); the dispatcher retries up to
//! [`DISPATCH_MAX_ATTEMPTS`] with linearly increasing delay and, when
//! every attempt is exhausted, marks the job `Failed` - a job is never
//! left silently `Processing` because the trigger itself failed.

use std::sync::Arc;

use serde_json::json;

use atelier_core::diagnostics::DiagnosticUpdate;
use atelier_core::generation::{dispatch_backoff, DISPATCH_MAX_ATTEMPTS};
use atelier_core::types::DbId;
use atelier_events::bus::{EventBus, JobEvent, EVENT_JOB_FAILED};
use atelier_worker::{JobStore, JobTrigger};

/// Delivers job ids to the worker pool, with retry and failure fallback.
pub struct Dispatcher {
    trigger: Arc<dyn JobTrigger>,
    store: Arc<dyn JobStore>,
    bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        trigger: Arc<dyn JobTrigger>,
        store: Arc<dyn JobStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            trigger,
            store,
            bus,
        }
    }

    /// Fire-and-forget dispatch: the retry loop runs in a spawned task
    /// so the caller returns immediately.
    pub fn dispatch(self: &Arc<Self>, job_id: DbId) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.dispatch_with_retry(job_id).await;
        });
    }

    /// Deliver the trigger for `job_id`. Returns `true` once delivered.
    ///
    /// On exhaustion the job is transitioned to `Failed` with a
    /// dispatch-failure reason and `false` is returned.
    pub async fn dispatch_with_retry(&self, job_id: DbId) -> bool {
        for attempt in 1..=DISPATCH_MAX_ATTEMPTS {
            match self.trigger.trigger(job_id).await {
                Ok(()) => {
                    tracing::debug!(job_id, attempt, "Job dispatched");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(job_id, attempt, error = %e, "Trigger delivery failed");
                    if attempt < DISPATCH_MAX_ATTEMPTS {
                        tokio::time::sleep(dispatch_backoff(attempt)).await;
                    }
                }
            }
        }

        let reason = format!(
            "dispatch failed after {DISPATCH_MAX_ATTEMPTS} trigger attempts"
        );
        tracing::error!(job_id, "{reason}; marking job failed");

        let update = DiagnosticUpdate::new()
            .error(&reason)
            .log(format!("dispatcher: {reason}"));
        match self.store.fail(job_id, update).await {
            Ok(true) => {
                self.bus.publish(
                    JobEvent::new(EVENT_JOB_FAILED, job_id)
                        .with_payload(json!({ "reason": "dispatch_failed" })),
                );
            }
            Ok(false) => {
                tracing::warn!(job_id, "Job already terminal while recording dispatch failure");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record dispatch failure");
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use atelier_db::models::generation::CreateGenerationJob;
    use atelier_db::models::status::JobStatus;
    use atelier_worker::{InMemoryJobStore, TriggerError};

    use super::*;

    struct CountingTrigger {
        calls: AtomicU32,
        /// Attempt number from which deliveries start succeeding.
        /// 0 = always fail.
        succeed_from: u32,
    }

    #[async_trait]
    impl JobTrigger for CountingTrigger {
        async fn trigger(&self, _job_id: i64) -> Result<(), TriggerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.succeed_from > 0 && n >= self.succeed_from {
                Ok(())
            } else {
                Err(TriggerError::Full)
            }
        }
    }

    async fn submit(store: &InMemoryJobStore) -> i64 {
        store
            .create(&CreateGenerationJob {
                user_id: 7,
                session_id: 1,
                model_id: "sync-image".into(),
                prompt: "a red bicycle".into(),
                negative_prompt: None,
                reference_image: None,
                parameters: json!({}),
            })
            .await
            .unwrap()
            .id
    }

    fn dispatcher(store: Arc<InMemoryJobStore>, trigger: CountingTrigger) -> (Arc<CountingTrigger>, Dispatcher) {
        let trigger = Arc::new(trigger);
        let d = Dispatcher::new(
            trigger.clone(),
            store,
            Arc::new(EventBus::default()),
        );
        (trigger, d)
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_the_job_after_exactly_three_attempts() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        let (trigger, dispatcher) = dispatcher(
            store.clone(),
            CountingTrigger {
                calls: AtomicU32::new(0),
                succeed_from: 0,
            },
        );

        let delivered = dispatcher.dispatch_with_retry(job_id).await;

        assert!(!delivered);
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 3);
        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status_id, JobStatus::Failed.id());
        assert!(job.diagnostics["error"]
            .as_str()
            .unwrap()
            .contains("dispatch failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_on_a_retry_leaves_the_job_processing() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        let (trigger, dispatcher) = dispatcher(
            store.clone(),
            CountingTrigger {
                calls: AtomicU32::new(0),
                succeed_from: 2,
            },
        );

        let delivered = dispatcher.dispatch_with_retry(job_id).await;

        assert!(delivered);
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 2);
        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status_id, JobStatus::Processing.id());
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_does_not_sleep() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        let (trigger, dispatcher) = dispatcher(
            store.clone(),
            CountingTrigger {
                calls: AtomicU32::new(0),
                succeed_from: 1,
            },
        );

        let start = tokio::time::Instant::now();
        assert!(dispatcher.dispatch_with_retry(job_id).await);
        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }
}
