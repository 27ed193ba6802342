//! Configuration loaded from environment variables.
//!
//! All fields have defaults suitable for local development; production
//! overrides via environment.

use std::time::Duration;

use atelier_core::generation::STALE_THRESHOLD_SECS;
use atelier_providers::adapter::PollPolicy;
use atelier_worker::pool::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Age past which a `Processing` job is considered stuck.
    pub stale_threshold_secs: i64,
    /// Bound of the in-process dispatch queue.
    pub queue_capacity: usize,
    /// Number of concurrently processing jobs.
    pub worker_concurrency: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `STALE_THRESHOLD_SECS`  | `300`                   |
    /// | `DISPATCH_QUEUE_CAPACITY` | `256`                 |
    /// | `WORKER_CONCURRENCY`    | `4`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let stale_threshold_secs: i64 = std::env::var("STALE_THRESHOLD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(STALE_THRESHOLD_SECS);

        let queue_capacity: usize = std::env::var("DISPATCH_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        let worker_concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            stale_threshold_secs,
            queue_capacity,
            worker_concurrency,
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `local` or `s3`.
    pub backend: String,
    pub image_bucket: String,
    pub video_bucket: String,
    /// Base directory for the `local` backend.
    pub local_base_dir: String,
    /// Public URL prefix for the `local` backend.
    pub local_base_url: String,
    /// Optional CDN/base URL override for the `s3` backend.
    pub s3_public_base_url: Option<String>,
}

impl StorageConfig {
    /// | Env Var               | Default                          |
    /// |-----------------------|----------------------------------|
    /// | `STORAGE_BACKEND`     | `local`                          |
    /// | `IMAGE_BUCKET`        | `atelier-images`                 |
    /// | `VIDEO_BUCKET`        | `atelier-videos`                 |
    /// | `LOCAL_STORAGE_DIR`   | `./objects`                      |
    /// | `LOCAL_STORAGE_URL`   | `http://localhost:3000/objects`  |
    /// | `S3_PUBLIC_BASE_URL`  | (unset)                          |
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into()),
            image_bucket: std::env::var("IMAGE_BUCKET")
                .unwrap_or_else(|_| "atelier-images".into()),
            video_bucket: std::env::var("VIDEO_BUCKET")
                .unwrap_or_else(|_| "atelier-videos".into()),
            local_base_dir: std::env::var("LOCAL_STORAGE_DIR")
                .unwrap_or_else(|_| "./objects".into()),
            local_base_url: std::env::var("LOCAL_STORAGE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/objects".into()),
            s3_public_base_url: std::env::var("S3_PUBLIC_BASE_URL").ok(),
        }
    }
}

/// Provider endpoints and the model ids they register under.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    /// Synchronous image API, registered when the URL is set.
    pub image_api_url: Option<String>,
    pub image_api_key: Option<String>,
    pub image_model_id: String,
    /// Long-running video API, registered when the URL is set.
    pub video_api_url: Option<String>,
    pub video_api_key: Option<String>,
    pub video_model_id: String,
    pub video_poll: PollPolicy,
}

impl ProvidersConfig {
    /// | Env Var                   | Default      |
    /// |---------------------------|--------------|
    /// | `IMAGE_API_URL`           | (unset)      |
    /// | `IMAGE_API_KEY`           | (unset)      |
    /// | `IMAGE_MODEL_ID`          | `sync-image` |
    /// | `VIDEO_API_URL`           | (unset)      |
    /// | `VIDEO_API_KEY`           | (unset)      |
    /// | `VIDEO_MODEL_ID`          | `video-pro`  |
    /// | `VIDEO_POLL_INTERVAL_SECS`| `10`         |
    /// | `VIDEO_POLL_MAX_ATTEMPTS` | `30`         |
    pub fn from_env() -> Self {
        let default_poll = PollPolicy::default();
        let interval_secs: u64 = std::env::var("VIDEO_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_poll.interval.as_secs());
        let max_attempts: u32 = std::env::var("VIDEO_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_poll.max_attempts);

        Self {
            image_api_url: std::env::var("IMAGE_API_URL").ok(),
            image_api_key: std::env::var("IMAGE_API_KEY").ok(),
            image_model_id: std::env::var("IMAGE_MODEL_ID")
                .unwrap_or_else(|_| "sync-image".into()),
            video_api_url: std::env::var("VIDEO_API_URL").ok(),
            video_api_key: std::env::var("VIDEO_API_KEY").ok(),
            video_model_id: std::env::var("VIDEO_MODEL_ID")
                .unwrap_or_else(|_| "video-pro".into()),
            video_poll: PollPolicy {
                interval: Duration::from_secs(interval_secs),
                max_attempts,
            },
        }
    }
}
