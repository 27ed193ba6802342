//! Periodic sweep for jobs stuck in a non-terminal state.
//!
//! A job can be left `Processing` forever when its worker dies between
//! claim and finalize, or when a dispatch was delivered but the process
//! crashed. The reconciler fails any `Processing` job older than the
//! staleness threshold, merging a synthetic diagnostic entry
//! (`reason: timeout`, detection timestamp) into whatever diagnostics the
//! job already carries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use atelier_core::diagnostics::{DiagnosticUpdate, REASON_TIMEOUT};
use atelier_core::error::CoreError;
use atelier_core::types::DbId;
use atelier_events::bus::{EventBus, JobEvent, EVENT_JOB_RECONCILED};
use atelier_worker::JobStore;

/// How often the background sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Detects and resolves stale `Processing` jobs.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    bus: Arc<EventBus>,
    threshold_secs: i64,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>, bus: Arc<EventBus>, threshold_secs: i64) -> Self {
        Self {
            store,
            bus,
            threshold_secs,
        }
    }

    pub fn threshold_secs(&self) -> i64 {
        self.threshold_secs
    }

    /// Run the periodic sweep until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        tracing::info!(
            threshold_secs = self.threshold_secs,
            interval_secs = SWEEP_INTERVAL.as_secs(),
            "Job reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job reconciler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Reconciler sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep: fail every stale job, exactly once each. Returns the
    /// ids transitioned.
    pub async fn sweep(&self) -> Result<Vec<DbId>, CoreError> {
        let failed = self
            .store
            .fail_stale(self.threshold_secs, DiagnosticUpdate::stale_timeout())
            .await?;

        if !failed.is_empty() {
            tracing::warn!(count = failed.len(), job_ids = ?failed, "Reconciler failed stale jobs");
            for &job_id in &failed {
                self.bus.publish(
                    JobEvent::new(EVENT_JOB_RECONCILED, job_id)
                        .with_payload(json!({ "reason": REASON_TIMEOUT })),
                );
            }
        }
        Ok(failed)
    }

    /// Resolve a single stuck job, regardless of the sweep schedule.
    ///
    /// Returns `false` when the job is no longer `Processing` (nothing
    /// to fix).
    pub async fn fix_one(&self, job_id: DbId) -> Result<bool, CoreError> {
        let fixed = self
            .store
            .fail(job_id, DiagnosticUpdate::stale_timeout())
            .await?;
        if fixed {
            tracing::warn!(job_id, "Stuck job marked failed");
            self.bus.publish(
                JobEvent::new(EVENT_JOB_RECONCILED, job_id)
                    .with_payload(json!({ "reason": REASON_TIMEOUT })),
            );
        }
        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use atelier_core::generation::STALE_THRESHOLD_SECS;
    use atelier_db::models::generation::CreateGenerationJob;
    use atelier_db::models::status::JobStatus;
    use atelier_worker::InMemoryJobStore;

    use super::*;

    async fn submit(store: &InMemoryJobStore) -> DbId {
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

    fn reconciler(store: Arc<InMemoryJobStore>) -> Reconciler {
        Reconciler::new(store, Arc::new(EventBus::default()), STALE_THRESHOLD_SECS)
    }

    #[tokio::test]
    async fn stale_job_is_failed_exactly_once_across_sweeps() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        store.backdate(job_id, STALE_THRESHOLD_SECS + 60);
        let r = reconciler(store.clone());

        assert_eq!(r.sweep().await.unwrap(), vec![job_id]);
        assert!(r.sweep().await.unwrap().is_empty());

        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status_id, JobStatus::Failed.id());
        assert_eq!(job.diagnostics["reason"], "timeout");
        assert!(job.diagnostics["detected_at"].is_string());
    }

    #[tokio::test]
    async fn sweep_preserves_prior_diagnostics() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        store
            .merge_diagnostics(
                job_id,
                DiagnosticUpdate::new().step("generate").log("adapter called"),
            )
            .await
            .unwrap();
        store.backdate(job_id, STALE_THRESHOLD_SECS + 60);

        reconciler(store.clone()).sweep().await.unwrap();

        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.diagnostics["last_step"], "generate");
        assert_eq!(job.diagnostics["reason"], "timeout");
        let logs = job.debug_logs.as_array().unwrap();
        assert_eq!(logs[0], "adapter called");
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn fresh_jobs_are_left_alone() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;

        assert!(reconciler(store.clone()).sweep().await.unwrap().is_empty());
        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status_id, JobStatus::Processing.id());
    }

    #[tokio::test]
    async fn fix_one_is_a_no_op_on_terminal_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = submit(&store).await;
        let r = reconciler(store.clone());

        assert!(r.fix_one(job_id).await.unwrap());
        assert!(!r.fix_one(job_id).await.unwrap());
    }
}
