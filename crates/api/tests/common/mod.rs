//! Shared harness for router-level integration tests.
//!
//! Mirrors the production wiring in `main.rs` - same router builder,
//! same middleware stack - with stub provider backends, a stub object
//! store, and the in-memory job store, so the full request → dispatch →
//! process → finalize path runs without external services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use atelier_api::background::reconciler::Reconciler;
use atelier_api::config::ServerConfig;
use atelier_api::dispatch::Dispatcher;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_db::models::generation::CreateGenerationJob;
use atelier_db::models::status::{ContentKind, JobStatus};
use atelier_events::EventBus;
use atelier_providers::adapter::{
    GenerationRequest, LongRunningGeneration, OperationStatus, OutputDescriptor, PollPolicy,
    ProviderAdapter, ReferenceHandle, SyncGeneration,
};
use atelier_providers::{ProviderError, ProviderRegistry};
use atelier_storage::{Materializer, ObjectStore, StorageBuckets, StorageError};
use atelier_worker::{job_queue, InMemoryJobStore, JobStore, Processor, WorkerPool};

/// Test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        stale_threshold_secs: 300,
        queue_capacity: 16,
        worker_concurrency: 2,
    }
}

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

struct RefusingSync;

#[async_trait]
impl SyncGeneration for RefusingSync {
    async fn generate_one(
        &self,
        _request: &GenerationRequest,
        index: u32,
    ) -> Result<OutputDescriptor, ProviderError> {
        Err(ProviderError::Upstream(format!("call {index} refused")))
    }
}

struct StallingVideo;

#[async_trait]
impl LongRunningGeneration for StallingVideo {
    async fn upload_reference(&self, _data: &[u8], _mime: &str) -> Result<String, ProviderError> {
        Ok("files/ref".into())
    }

    async fn submit(
        &self,
        _request: &GenerationRequest,
        _reference: Option<&ReferenceHandle>,
    ) -> Result<String, ProviderError> {
        Ok("operations/stalled".into())
    }

    async fn poll(&self, _operation: &str) -> Result<OperationStatus, ProviderError> {
        Ok(OperationStatus {
            done: false,
            result_uri: None,
            error: None,
        })
    }
}

struct StubObjectStore;

#[async_trait]
impl ObjectStore for StubObjectStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
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

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryJobStore>,
    pub cancel: CancellationToken,
}

/// Build the application with stub providers and spawn its worker pool.
///
/// Registered models:
/// - `sync-image`  - every call succeeds with an inline payload
/// - `sync-flaky`  - every call fails
/// - `video-stall` - long-running operation that never completes
///   (3 poll attempts at 5ms, so tests see the timeout quickly)
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(InMemoryJobStore::new());
    let job_store: Arc<dyn JobStore> = store.clone();
    let event_bus = Arc::new(EventBus::default());

    let mut registry = ProviderRegistry::new();
    registry.register("sync-image", ProviderAdapter::Sync(Arc::new(InlineSync)));
    registry.register("sync-flaky", ProviderAdapter::Sync(Arc::new(RefusingSync)));
    registry.register(
        "video-stall",
        ProviderAdapter::LongRunning(
            Arc::new(StallingVideo),
            PollPolicy {
                interval: Duration::from_millis(5),
                max_attempts: 3,
            },
        ),
    );
    let registry = Arc::new(registry);

    let materializer = Arc::new(Materializer::new(
        Arc::new(StubObjectStore),
        StorageBuckets {
            images: "atelier-images".into(),
            videos: "atelier-videos".into(),
        },
    ));

    let cancel = CancellationToken::new();
    let (trigger, receiver) = job_queue(config.queue_capacity);
    let processor = Arc::new(Processor::new(
        Arc::clone(&job_store),
        Arc::clone(&registry),
        materializer,
        Arc::clone(&event_bus),
    ));
    tokio::spawn(
        WorkerPool::new(Arc::clone(&processor), config.worker_concurrency)
            .run(receiver, cancel.clone()),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(trigger),
        Arc::clone(&job_store),
        Arc::clone(&event_bus),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&job_store),
        Arc::clone(&event_bus),
        config.stale_threshold_secs,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        job_store,
        dispatcher,
        processor,
        reconciler,
        event_bus,
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        cancel,
    }
}

/// Issue one request against the router and decode the JSON body.
pub async fn request_json(
    router: &Router,
    method: Method,
    uri: &str,
    user_id: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(uid) = user_id {
        builder = builder.header("x-user-id", uid.to_string());
    }

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Insert a job directly into the store, bypassing the HTTP surface.
pub async fn seed_job(store: &InMemoryJobStore, model_id: &str, parameters: Value) -> i64 {
    store
        .create(&CreateGenerationJob {
            user_id: 7,
            session_id: 1,
            model_id: model_id.into(),
            prompt: "a red bicycle".into(),
            negative_prompt: None,
            reference_image: None,
            parameters,
        })
        .await
        .unwrap()
        .id
}

/// Wait until the job reaches `status`, panicking after five seconds.
pub async fn wait_for_status(store: &InMemoryJobStore, job_id: i64, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = store.load(job_id).await.unwrap().unwrap().status_id;
        if current == status.id() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} never reached {}",
            status.as_str()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
