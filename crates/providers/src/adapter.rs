//! Adapter variants and the per-variant generation drivers.
//!
//! [`ProviderAdapter`] is a tagged variant chosen once per model when the
//! registry is built - the driver logic dispatches on the variant, never
//! on runtime type inspection. Backends implement the narrow
//! [`SyncGeneration`] / [`LongRunningGeneration`] traits; the batching,
//! polling, and reference-upload behavior lives here so every backend of
//! the same variant behaves identically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use atelier_core::generation::resolve_dimensions;
use atelier_db::models::status::ContentKind;

use crate::error::ProviderError;
use crate::payload::{decode_inline, ContentRef};

/// One generation call as seen by an adapter.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Reference image as submitted: inline base64 payload or URL.
    pub reference_image: Option<String>,
    /// Number of outputs requested. Only the synchronous variant fans
    /// out; long-running providers produce one artifact per operation.
    pub output_count: u32,
    pub aspect_ratio: String,
    /// Requested clip length, video models only.
    pub duration_secs: Option<f64>,
    /// Remaining free-form parameters, passed through to the backend.
    pub parameters: serde_json::Value,
}

/// One artifact reference returned by a provider.
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    /// Inline payload, external URL, or cloud URI. Classified later by
    /// the materializer.
    pub content_ref: String,
    pub kind: ContentKind,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
}

/// Result of a successful (possibly partial) adapter batch.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub descriptors: Vec<OutputDescriptor>,
    /// Non-fatal degradations: per-output failures in a best-effort
    /// batch, a tolerated reference-upload failure, and the like. The
    /// worker records these in the job diagnostics.
    pub warnings: Vec<String>,
}

/// A reference input as handed to `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceHandle {
    /// Handle returned by the provider's asset-storage endpoint.
    ProviderFile(String),
    /// Externally hosted image the provider fetches itself.
    Url(String),
}

/// Backend seam for synchronous, one-artifact-per-call providers.
#[async_trait]
pub trait SyncGeneration: Send + Sync {
    /// Issue one provider call for output `index`.
    async fn generate_one(
        &self,
        request: &GenerationRequest,
        index: u32,
    ) -> Result<OutputDescriptor, ProviderError>;
}

/// Poll answer for a long-running operation.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub done: bool,
    pub result_uri: Option<String>,
    /// In-band failure reported by the provider.
    pub error: Option<String>,
}

/// Backend seam for submit-then-poll providers.
#[async_trait]
pub trait LongRunningGeneration: Send + Sync {
    /// Upload a reference image to the provider's asset storage and
    /// return the file handle to cite in `submit`.
    async fn upload_reference(
        &self,
        data: &[u8],
        mime: &str,
    ) -> Result<String, ProviderError>;

    /// Submit one operation; returns an opaque operation handle.
    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceHandle>,
    ) -> Result<String, ProviderError>;

    /// Query the state of a previously submitted operation.
    async fn poll(&self, operation: &str) -> Result<OperationStatus, ProviderError>;
}

/// Polling cadence and budget for a long-running model.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// 10s between polls, 30 attempts: a five-minute ceiling.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

/// A registered provider adapter. The variant is fixed per model.
#[derive(Clone)]
pub enum ProviderAdapter {
    Sync(Arc<dyn SyncGeneration>),
    LongRunning(Arc<dyn LongRunningGeneration>, PollPolicy),
}

impl ProviderAdapter {
    /// Run one generation request to a settled outcome.
    ///
    /// Never panics and never returns a transport error as such - every
    /// failure mode is a [`ProviderError`] variant.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, ProviderError> {
        match self {
            ProviderAdapter::Sync(backend) => generate_sync(backend.as_ref(), request).await,
            ProviderAdapter::LongRunning(backend, policy) => {
                generate_long_running(backend.as_ref(), *policy, request).await
            }
        }
    }

    /// Human-readable variant name for logs.
    pub fn variant(&self) -> &'static str {
        match self {
            ProviderAdapter::Sync(_) => "sync",
            ProviderAdapter::LongRunning(..) => "long-running",
        }
    }
}

/// Best-effort fan-out: N concurrent calls, success if at least one call
/// succeeds, per-call failures demoted to warnings.
async fn generate_sync(
    backend: &dyn SyncGeneration,
    request: &GenerationRequest,
) -> Result<GenerationOutcome, ProviderError> {
    let count = request.output_count.max(1);
    let calls = (0..count).map(|index| backend.generate_one(request, index));
    let results = join_all(calls).await;

    let mut descriptors = Vec::new();
    let mut warnings = Vec::new();
    let mut first_error: Option<String> = None;

    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => {
                let message = e.to_string();
                if first_error.is_none() {
                    first_error = Some(message.clone());
                }
                warnings.push(format!("output {index} failed: {message}"));
            }
        }
    }

    if descriptors.is_empty() {
        return Err(ProviderError::AllOutputsFailed {
            attempted: count,
            first_error: first_error.unwrap_or_else(|| "no calls issued".into()),
        });
    }

    Ok(GenerationOutcome {
        descriptors,
        warnings,
    })
}

/// Submit one operation and poll it to completion or budget exhaustion.
async fn generate_long_running(
    backend: &dyn LongRunningGeneration,
    policy: PollPolicy,
    request: &GenerationRequest,
) -> Result<GenerationOutcome, ProviderError> {
    let mut warnings = Vec::new();

    // Host the reference input with the provider when one was supplied.
    // An upload failure degrades the request instead of aborting it.
    let reference = match &request.reference_image {
        Some(raw) => match ContentRef::classify(raw) {
            ContentRef::Url(url) => Some(ReferenceHandle::Url(url)),
            ContentRef::CloudUri(uri) => Some(ReferenceHandle::Url(uri)),
            ContentRef::Inline(payload) => match decode_inline(&payload) {
                Ok((bytes, mime)) => match backend.upload_reference(&bytes, &mime).await {
                    Ok(handle) => Some(ReferenceHandle::ProviderFile(handle)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Reference upload failed, generating without it");
                        warnings.push(format!("reference upload failed: {e}"));
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Reference payload undecodable, generating without it");
                    warnings.push(format!("reference payload undecodable: {e}"));
                    None
                }
            },
        },
        None => None,
    };

    let operation = backend.submit(request, reference.as_ref()).await?;
    tracing::debug!(operation = %operation, "Long-running operation submitted");

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        let status = backend.poll(&operation).await?;

        if status.done {
            if let Some(message) = status.error {
                return Err(ProviderError::Upstream(message));
            }
            let uri = status.result_uri.ok_or_else(|| {
                ProviderError::MissingResult(format!(
                    "operation {operation} completed without a result uri"
                ))
            })?;

            let (width, height) = resolve_dimensions(&request.aspect_ratio);
            return Ok(GenerationOutcome {
                descriptors: vec![OutputDescriptor {
                    content_ref: uri,
                    kind: ContentKind::Video,
                    width: Some(width as i32),
                    height: Some(height as i32),
                    duration_secs: request.duration_secs,
                }],
                warnings,
            });
        }

        tracing::trace!(operation = %operation, attempt, "Operation still running");
    }

    Err(ProviderError::TimedOut {
        attempts: policy.max_attempts,
    })
}
