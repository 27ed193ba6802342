//! The processing pipeline for one generation job.
//!
//! Entry point is [`Processor::process_job`]: load, terminal no-op
//! check, atomic claim, adapter call, materialization, finalize. Every
//! error raised anywhere in the sequence is converted into a `Failed`
//! transition with the message recorded - the worker never hands an
//! unhandled error back to its caller while the job record still says
//! `Processing`.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use atelier_core::diagnostics::{DiagnosticUpdate, KEY_REFERENCE_IMAGE_URL};
use atelier_core::error::CoreError;
use atelier_core::generation::{DEFAULT_ASPECT_RATIO, DEFAULT_OUTPUT_COUNT};
use atelier_core::types::DbId;
use atelier_db::models::generation::GenerationJob;
use atelier_db::models::output::NewGenerationOutput;
use atelier_db::models::status::JobStatus;
use atelier_events::bus::{EventBus, JobEvent, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED};
use atelier_providers::adapter::GenerationRequest;
use atelier_providers::payload::ContentRef;
use atelier_providers::ProviderRegistry;
use atelier_storage::Materializer;

use crate::store::JobStore;

/// Executes generation jobs against the provider and storage layers.
pub struct Processor {
    store: Arc<dyn JobStore>,
    registry: Arc<ProviderRegistry>,
    materializer: Arc<Materializer>,
    bus: Arc<EventBus>,
    worker_id: String,
}

impl Processor {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ProviderRegistry>,
        materializer: Arc<Materializer>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            registry,
            materializer,
            bus,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Identifier recorded as the claim holder.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Process one job to a settled state and report the final status.
    ///
    /// Re-entrant: a terminal job is reported as-is, a job claimed by
    /// another worker is left alone.
    pub async fn process_job(&self, job_id: DbId) -> Result<JobStatus, CoreError> {
        let job = self
            .store
            .load(job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "GenerationJob",
                id: job_id,
            })?;

        let status = JobStatus::from_id(job.status_id).ok_or_else(|| {
            CoreError::Internal(format!("job {job_id} has unknown status {}", job.status_id))
        })?;
        if status.is_terminal() {
            tracing::info!(job_id, status = status.as_str(), "Job already terminal, nothing to do");
            return Ok(status);
        }

        let Some(job) = self.store.claim(job_id, &self.worker_id).await? else {
            // Lost the claim race, or the job turned terminal since the
            // load above. Either way another writer owns the record.
            let current = self
                .store
                .load(job_id)
                .await?
                .and_then(|j| JobStatus::from_id(j.status_id))
                .unwrap_or(JobStatus::Processing);
            tracing::info!(job_id, status = current.as_str(), "Claim not taken, skipping");
            return Ok(current);
        };

        tracing::info!(
            job_id,
            model_id = %job.model_id,
            worker_id = %self.worker_id,
            "Job claimed",
        );

        match self.run_pipeline(&job).await {
            Ok(status) => Ok(status),
            Err(e) => {
                tracing::error!(job_id, error = %e, "Processing failed");
                self.fail_job(job_id, &e.to_string()).await?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Record a failure reason and transition the job to `Failed`.
    ///
    /// A no-op when the job is already terminal. Also used by the worker
    /// pool's panic guard.
    pub async fn fail_job(&self, job_id: DbId, reason: &str) -> Result<bool, CoreError> {
        let update = DiagnosticUpdate::new()
            .error(reason)
            .log(format!("processing failed: {reason}"));
        let failed = self.store.fail(job_id, update).await?;
        if failed {
            self.bus.publish(
                JobEvent::new(EVENT_JOB_FAILED, job_id)
                    .with_payload(json!({ "reason": reason })),
            );
        }
        Ok(failed)
    }

    /// The generate → materialize → finalize sequence for a claimed job.
    async fn run_pipeline(&self, job: &GenerationJob) -> Result<JobStatus, CoreError> {
        let adapter = self
            .registry
            .resolve(&job.model_id)
            .ok_or_else(|| CoreError::UnknownModel(job.model_id.clone()))?;

        // An inline reference has no stable location yet; persist it so
        // diagnostics and later reads can cite a durable URL.
        if let Some(raw) = &job.reference_image {
            if matches!(ContentRef::classify(raw), ContentRef::Inline(_)) {
                self.store
                    .merge_diagnostics(job.id, DiagnosticUpdate::new().step("persist_reference"))
                    .await?;
                let url = self
                    .materializer
                    .persist_reference(raw, job.user_id, job.id)
                    .await
                    .map_err(CoreError::from)?;
                self.store
                    .merge_diagnostics(
                        job.id,
                        DiagnosticUpdate::new()
                            .entry(KEY_REFERENCE_IMAGE_URL, json!(url))
                            .log(format!("reference image persisted to {url}")),
                    )
                    .await?;
            }
        }

        let request = request_from_job(job);
        self.store
            .merge_diagnostics(
                job.id,
                DiagnosticUpdate::new().step("generate").log(format!(
                    "calling {} adapter for model {}",
                    adapter.variant(),
                    job.model_id
                )),
            )
            .await?;

        let outcome = adapter.generate(&request).await.map_err(CoreError::from)?;

        if !outcome.warnings.is_empty() {
            let mut update = DiagnosticUpdate::new();
            for warning in &outcome.warnings {
                update = update.log(format!("warning: {warning}"));
            }
            self.store.merge_diagnostics(job.id, update).await?;
        }

        self.store
            .merge_diagnostics(job.id, DiagnosticUpdate::new().step("materialize"))
            .await?;

        let mut outputs = Vec::with_capacity(outcome.descriptors.len());
        let mut degradations = DiagnosticUpdate::new();
        for (index, descriptor) in outcome.descriptors.iter().enumerate() {
            let materialized = self
                .materializer
                .materialize(descriptor, job.user_id, job.id, index as i32)
                .await
                .map_err(CoreError::from)?;

            if let Some(warning) = &materialized.warning {
                degradations = degradations.log(format!("warning: {warning}"));
            }

            outputs.push(NewGenerationOutput {
                job_id: job.id,
                output_index: index as i32,
                url: materialized.url,
                content_kind: descriptor.kind.id(),
                width: descriptor.width,
                height: descriptor.height,
                duration_secs: descriptor.duration_secs,
                durable: materialized.durable,
            });
        }
        if !degradations.is_empty() {
            self.store.merge_diagnostics(job.id, degradations).await?;
        }

        let completed = self.store.complete_with_outputs(job.id, &outputs).await?;
        if !completed {
            // The reconciler (or an administrative fail) won the race.
            // Outputs were not inserted; report the record's actual state.
            let current = self
                .store
                .load(job.id)
                .await?
                .and_then(|j| JobStatus::from_id(j.status_id))
                .unwrap_or(JobStatus::Failed);
            tracing::warn!(
                job_id = job.id,
                status = current.as_str(),
                "Completion lost to a concurrent transition",
            );
            return Ok(current);
        }

        self.store
            .merge_diagnostics(
                job.id,
                DiagnosticUpdate::new()
                    .step("finalize")
                    .log(format!("completed with {} outputs", outputs.len())),
            )
            .await?;
        self.bus.publish(
            JobEvent::new(EVENT_JOB_COMPLETED, job.id)
                .with_payload(json!({ "output_count": outputs.len() })),
        );

        Ok(JobStatus::Completed)
    }
}

/// Build the adapter-level request from a persisted job.
///
/// The parameter map is user-controlled; recognised keys are extracted
/// with defaults, everything else passes through untouched.
pub fn request_from_job(job: &GenerationJob) -> GenerationRequest {
    let params = &job.parameters;
    let output_count = params
        .get("num_outputs")
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .unwrap_or(DEFAULT_OUTPUT_COUNT);
    let aspect_ratio = params
        .get("aspect_ratio")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ASPECT_RATIO)
        .to_string();
    let duration_secs = params.get("duration_secs").and_then(Value::as_f64);

    GenerationRequest {
        prompt: job.prompt.clone(),
        negative_prompt: job.negative_prompt.clone(),
        reference_image: job.reference_image.clone(),
        output_count,
        aspect_ratio,
        duration_secs,
        parameters: job.parameters.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use atelier_db::models::generation::CreateGenerationJob;
    use atelier_db::models::status::ContentKind;
    use atelier_providers::adapter::{
        LongRunningGeneration, OperationStatus, OutputDescriptor, PollPolicy, ProviderAdapter,
        ReferenceHandle, SyncGeneration,
    };
    use atelier_providers::ProviderError;
    use atelier_storage::{ObjectStore, StorageBuckets, StorageError};

    use crate::store::InMemoryJobStore;

    use super::*;

    // -- stub provider backends ---------------------------------------

    struct StubSync {
        fail_indices: Vec<u32>,
    }

    #[async_trait]
    impl SyncGeneration for StubSync {
        async fn generate_one(
            &self,
            _request: &GenerationRequest,
            index: u32,
        ) -> Result<OutputDescriptor, ProviderError> {
            if self.fail_indices.contains(&index) {
                return Err(ProviderError::Upstream(format!("call {index} refused")));
            }
            Ok(OutputDescriptor {
                content_ref: format!("https://img.provider.example/{index}.png"),
                kind: ContentKind::Image,
                width: Some(1024),
                height: Some(1024),
                duration_secs: None,
            })
        }
    }

    struct NeverDone;

    #[async_trait]
    impl LongRunningGeneration for NeverDone {
        async fn upload_reference(
            &self,
            _data: &[u8],
            _mime: &str,
        ) -> Result<String, ProviderError> {
            Ok("files/ref".into())
        }

        async fn submit(
            &self,
            _request: &GenerationRequest,
            _reference: Option<&ReferenceHandle>,
        ) -> Result<String, ProviderError> {
            Ok("operations/slow".into())
        }

        async fn poll(&self, _operation: &str) -> Result<OperationStatus, ProviderError> {
            Ok(OperationStatus {
                done: false,
                result_uri: None,
                error: None,
            })
        }
    }

    // -- stub object store --------------------------------------------

    #[derive(Default)]
    struct StubStore {
        fail_all: bool,
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for StubStore {
        async fn put_bytes(
            &self,
            bucket: &str,
            key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, StorageError> {
            if self.fail_all {
                return Err(StorageError::Upload("bucket unavailable".into()));
            }
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("https://store.example.com/{bucket}/{key}"))
        }

        async fn put_from_url(
            &self,
            bucket: &str,
            key: &str,
            _url: &str,
        ) -> Result<String, StorageError> {
            self.put_bytes(bucket, key, Vec::new(), "application/octet-stream")
                .await
        }

        async fn copy_object(
            &self,
            bucket: &str,
            key: &str,
            _source_uri: &str,
        ) -> Result<String, StorageError> {
            self.put_bytes(bucket, key, Vec::new(), "application/octet-stream")
                .await
        }
    }

    // -- harness -------------------------------------------------------

    struct Harness {
        store: Arc<InMemoryJobStore>,
        processor: Processor,
        bus: Arc<EventBus>,
    }

    fn harness_with(registry: ProviderRegistry, object_store: StubStore) -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let bus = Arc::new(EventBus::default());
        let materializer = Arc::new(Materializer::new(
            Arc::new(object_store),
            StorageBuckets {
                images: "atelier-images".into(),
                videos: "atelier-videos".into(),
            },
        ));
        let processor = Processor::new(
            store.clone(),
            Arc::new(registry),
            materializer,
            bus.clone(),
        );
        Harness {
            store,
            processor,
            bus,
        }
    }

    fn sync_registry(fail_indices: Vec<u32>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(
            "sync-image",
            ProviderAdapter::Sync(Arc::new(StubSync { fail_indices })),
        );
        registry
    }

    async fn submit_job(store: &InMemoryJobStore, model_id: &str, params: Value) -> DbId {
        let job = store
            .create(&CreateGenerationJob {
                user_id: 7,
                session_id: 1,
                model_id: model_id.into(),
                prompt: "a red bicycle".into(),
                negative_prompt: None,
                reference_image: None,
                parameters: params,
            })
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn completes_with_all_outputs_when_every_call_succeeds() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let job_id = submit_job(&h.store, "sync-image", json!({ "num_outputs": 2 })).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Completed);
        let outputs = h.store.outputs(job_id).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.durable));
        assert!(outputs[0].url.starts_with("https://store.example.com/atelier-images/7/"));
    }

    #[tokio::test]
    async fn partial_batch_persists_only_successful_outputs() {
        let h = harness_with(sync_registry(vec![1]), StubStore::default());
        let job_id = submit_job(&h.store, "sync-image", json!({ "num_outputs": 3 })).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(h.store.count_outputs(job_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fails_with_no_outputs_when_every_call_fails() {
        let h = harness_with(sync_registry(vec![0, 1]), StubStore::default());
        let job_id = submit_job(&h.store, "sync-image", json!({ "num_outputs": 2 })).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(h.store.count_outputs(job_id).await.unwrap(), 0);
        let job = h.store.load(job_id).await.unwrap().unwrap();
        assert!(job.diagnostics["error"].as_str().unwrap().contains("2 provider calls failed"));
    }

    #[tokio::test]
    async fn reprocessing_a_terminal_job_is_a_no_op() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let job_id = submit_job(&h.store, "sync-image", json!({ "num_outputs": 2 })).await;

        let first = h.processor.process_job(job_id).await.unwrap();
        let count_after_first = h.store.count_outputs(job_id).await.unwrap();

        let second = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(first, JobStatus::Completed);
        assert_eq!(second, JobStatus::Completed);
        assert_eq!(h.store.count_outputs(job_id).await.unwrap(), count_after_first);
    }

    #[tokio::test]
    async fn unknown_model_fails_the_job_immediately() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let job_id = submit_job(&h.store, "no-such-model", json!({})).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Failed);
        let job = h.store.load(job_id).await.unwrap().unwrap();
        assert!(job.diagnostics["error"].as_str().unwrap().contains("no-such-model"));
    }

    #[tokio::test]
    async fn storage_failure_on_inline_output_fails_the_job() {
        // Inline payloads have no fallback location; the upload failure
        // is fatal and must be recorded.
        let mut registry = ProviderRegistry::new();
        struct InlineSync;
        #[async_trait]
        impl SyncGeneration for InlineSync {
            async fn generate_one(
                &self,
                _request: &GenerationRequest,
                _index: u32,
            ) -> Result<OutputDescriptor, ProviderError> {
                Ok(OutputDescriptor {
                    content_ref: "aGVsbG8=".into(),
                    kind: ContentKind::Image,
                    width: Some(1024),
                    height: Some(1024),
                    duration_secs: None,
                })
            }
        }
        registry.register("sync-image", ProviderAdapter::Sync(Arc::new(InlineSync)));

        let h = harness_with(
            registry,
            StubStore {
                fail_all: true,
                ..Default::default()
            },
        );
        let job_id = submit_job(&h.store, "sync-image", json!({})).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(h.store.count_outputs(job_id).await.unwrap(), 0);
        let job = h.store.load(job_id).await.unwrap().unwrap();
        assert!(job.diagnostics["error"].as_str().unwrap().contains("Upload failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_timeout_fails_with_timed_out_reason() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            "video-pro",
            ProviderAdapter::LongRunning(Arc::new(NeverDone), PollPolicy::default()),
        );
        let h = harness_with(registry, StubStore::default());
        let job_id = submit_job(&h.store, "video-pro", json!({ "duration_secs": 4.0 })).await;

        let status = h.processor.process_job(job_id).await.unwrap();

        assert_eq!(status, JobStatus::Failed);
        let job = h.store.load(job_id).await.unwrap().unwrap();
        let error = job.diagnostics["error"].as_str().unwrap();
        assert!(error.contains("timed out"), "unexpected reason: {error}");
    }

    #[tokio::test]
    async fn inline_reference_is_persisted_before_generation() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let job = h
            .store
            .create(&CreateGenerationJob {
                user_id: 7,
                session_id: 1,
                model_id: "sync-image".into(),
                prompt: "in this style".into(),
                negative_prompt: None,
                reference_image: Some("data:image/png;base64,aGVsbG8=".into()),
                parameters: json!({}),
            })
            .await
            .unwrap();

        h.processor.process_job(job.id).await.unwrap();

        let job = h.store.load(job.id).await.unwrap().unwrap();
        let url = job.diagnostics["reference_image_url"].as_str().unwrap();
        assert!(url.ends_with(&format!("7/{}/reference.png", job.id)));
    }

    #[tokio::test]
    async fn completion_publishes_an_event() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let mut rx = h.bus.subscribe();
        let job_id = submit_job(&h.store, "sync-image", json!({ "num_outputs": 1 })).await;

        h.processor.process_job(job_id).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_JOB_COMPLETED);
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.payload["output_count"], 1);
    }

    #[tokio::test]
    async fn processing_a_missing_job_reports_not_found() {
        let h = harness_with(sync_registry(vec![]), StubStore::default());
        let err = h.processor.process_job(999).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn request_extraction_applies_defaults() {
        let job = GenerationJob {
            id: 1,
            user_id: 7,
            session_id: 1,
            model_id: "sync-image".into(),
            prompt: "a red bicycle".into(),
            negative_prompt: None,
            reference_image: None,
            parameters: json!({ "aspect_ratio": "16:9" }),
            status_id: JobStatus::Processing.id(),
            claimed_by: None,
            claimed_at: None,
            diagnostics: json!({}),
            debug_logs: json!([]),
            created_at: chrono::Utc::now(),
            completed_at: None,
        };

        let request = request_from_job(&job);
        assert_eq!(request.output_count, DEFAULT_OUTPUT_COUNT);
        assert_eq!(request.aspect_ratio, "16:9");
        assert_eq!(request.duration_secs, None);
    }
}
