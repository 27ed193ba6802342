use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::background::reconciler::Reconciler;
use atelier_api::config::{ProvidersConfig, ServerConfig, StorageConfig};
use atelier_api::dispatch::Dispatcher;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_events::{EventBus, EventPersistence};
use atelier_providers::adapter::ProviderAdapter;
use atelier_providers::image_api::ImageApiClient;
use atelier_providers::video_api::VideoApiClient;
use atelier_providers::ProviderRegistry;
use atelier_storage::local::LocalObjectStore;
use atelier_storage::s3::S3ObjectStore;
use atelier_storage::{Materializer, ObjectStore, StorageBuckets};
use atelier_worker::{job_queue, JobStore, PgJobStore, Processor, WorkerPool};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = atelier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    atelier_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    atelier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Object storage ---
    let storage_config = StorageConfig::from_env();
    let object_store: Arc<dyn ObjectStore> = match storage_config.backend.as_str() {
        "s3" => {
            tracing::info!("Using S3 object storage");
            Arc::new(S3ObjectStore::from_env(storage_config.s3_public_base_url.clone()).await)
        }
        "local" => {
            tracing::info!(dir = %storage_config.local_base_dir, "Using local object storage");
            Arc::new(LocalObjectStore::new(
                storage_config.local_base_dir.clone(),
                storage_config.local_base_url.clone(),
            ))
        }
        other => panic!("Unknown STORAGE_BACKEND '{other}' (expected 'local' or 's3')"),
    };
    let materializer = Arc::new(Materializer::new(
        object_store,
        StorageBuckets {
            images: storage_config.image_bucket.clone(),
            videos: storage_config.video_bucket.clone(),
        },
    ));

    // --- Provider registry ---
    let providers_config = ProvidersConfig::from_env();
    let mut registry = ProviderRegistry::new();
    if let Some(url) = providers_config.image_api_url.clone() {
        registry.register(
            providers_config.image_model_id.clone(),
            ProviderAdapter::Sync(Arc::new(ImageApiClient::new(
                url,
                providers_config.image_api_key.clone(),
            ))),
        );
    }
    if let Some(url) = providers_config.video_api_url.clone() {
        registry.register(
            providers_config.video_model_id.clone(),
            ProviderAdapter::LongRunning(
                Arc::new(VideoApiClient::new(url, providers_config.video_api_key.clone())),
                providers_config.video_poll,
            ),
        );
    }
    if registry.model_ids().is_empty() {
        tracing::warn!("No providers configured; every generation request will be rejected");
    }
    let registry = Arc::new(registry);

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));

    // --- Job store, worker pool, dispatcher ---
    let job_store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));

    let cancel = CancellationToken::new();

    let (trigger, receiver) = job_queue(config.queue_capacity);
    let processor = Arc::new(Processor::new(
        Arc::clone(&job_store),
        Arc::clone(&registry),
        Arc::clone(&materializer),
        Arc::clone(&event_bus),
    ));
    let pool_handle = tokio::spawn(
        WorkerPool::new(Arc::clone(&processor), config.worker_concurrency)
            .run(receiver, cancel.clone()),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(trigger),
        Arc::clone(&job_store),
        Arc::clone(&event_bus),
    ));

    // --- Reconciler ---
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&job_store),
        Arc::clone(&event_bus),
        config.stale_threshold_secs,
    ));
    let reconciler_handle = {
        let reconciler = Arc::clone(&reconciler);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            reconciler.run(cancel).await;
        })
    };

    // --- App state and router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        job_store,
        dispatcher,
        processor,
        reconciler,
        event_bus,
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST"),
        config.port,
    );
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            shutdown_cancel.cancel();
        })
        .await
        .expect("Server error");

    // Stop background services and wait for them to drain.
    cancel.cancel();
    let _ = pool_handle.await;
    let _ = reconciler_handle.await;
    persistence_handle.abort();
    tracing::info!("Shutdown complete");
}
