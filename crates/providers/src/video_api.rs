//! REST client for long-running video-generation providers.
//!
//! The provider accepts one submission, returns an opaque operation id,
//! and is polled until the operation reports completion. Reference
//! images must be hosted with the provider first via its asset-storage
//! endpoint; some deployments only accept multipart uploads, so the
//! JSON-body attempt falls back to multipart on a 4xx answer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::adapter::{
    GenerationRequest, LongRunningGeneration, OperationStatus, ReferenceHandle,
};
use crate::error::ProviderError;
use crate::http::parse_json;

/// HTTP client for a submit-then-poll video-generation API.
pub struct VideoApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Response of the `POST /v1/videos` submission endpoint.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    operation_id: String,
}

/// Response of the `GET /v1/operations/{id}` endpoint.
#[derive(Debug, Deserialize)]
struct OperationResponse {
    done: bool,
    error: Option<String>,
    result: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
struct OperationResult {
    uri: Option<String>,
}

/// Response of the `POST /v1/assets` upload endpoint (both encodings).
#[derive(Debug, Deserialize)]
struct AssetUploadResponse {
    file_id: String,
}

impl VideoApiClient {
    /// Create a new client.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// JSON-body asset upload. Rejected by deployments that only accept
    /// multipart; the caller falls back in that case.
    async fn upload_json(&self, data: &[u8], mime: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "data": BASE64.encode(data),
            "mime_type": mime,
        });

        let response = self
            .authed(self.client.post(format!("{}/v1/assets", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let parsed: AssetUploadResponse = parse_json(response).await?;
        Ok(parsed.file_id)
    }

    /// Multipart asset upload fallback.
    async fn upload_multipart(&self, data: &[u8], mime: &str) -> Result<String, ProviderError> {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name("reference")
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authed(self.client.post(format!("{}/v1/assets", self.base_url)))
            .multipart(form)
            .send()
            .await?;

        let parsed: AssetUploadResponse = parse_json(response).await?;
        Ok(parsed.file_id)
    }
}

#[async_trait::async_trait]
impl LongRunningGeneration for VideoApiClient {
    async fn upload_reference(
        &self,
        data: &[u8],
        mime: &str,
    ) -> Result<String, ProviderError> {
        match self.upload_json(data, mime).await {
            Ok(handle) => Ok(handle),
            Err(ProviderError::Api { status, .. }) if (400..500).contains(&status) => {
                tracing::debug!(status, "JSON asset upload rejected, retrying as multipart");
                self.upload_multipart(data, mime).await
            }
            Err(e) => Err(e),
        }
    }

    async fn submit(
        &self,
        request: &GenerationRequest,
        reference: Option<&ReferenceHandle>,
    ) -> Result<String, ProviderError> {
        let mut body = serde_json::json!({
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "duration_secs": request.duration_secs,
            "parameters": request.parameters,
        });

        match reference {
            Some(ReferenceHandle::ProviderFile(handle)) => {
                body["reference_file_id"] = serde_json::json!(handle);
            }
            Some(ReferenceHandle::Url(url)) => {
                body["reference_image_url"] = serde_json::json!(url);
            }
            None => {}
        }

        let response = self
            .authed(self.client.post(format!("{}/v1/videos", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let parsed: SubmitResponse = parse_json(response).await?;
        Ok(parsed.operation_id)
    }

    async fn poll(&self, operation: &str) -> Result<OperationStatus, ProviderError> {
        let response = self
            .authed(
                self.client
                    .get(format!("{}/v1/operations/{operation}", self.base_url)),
            )
            .send()
            .await?;

        let parsed: OperationResponse = parse_json(response).await?;
        Ok(OperationStatus {
            done: parsed.done,
            result_uri: parsed.result.and_then(|r| r.uri),
            error: parsed.error,
        })
    }
}
