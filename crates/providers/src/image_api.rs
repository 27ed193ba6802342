//! REST client for synchronous image-generation providers.
//!
//! One HTTP call produces one artifact; the adapter driver fans out N
//! concurrent calls for N requested outputs. The provider may answer
//! with a hosted URL or an inline base64 payload - both are forwarded
//! untouched as the descriptor's content reference.

use serde::Deserialize;

use atelier_core::generation::resolve_dimensions;
use atelier_db::models::status::ContentKind;

use crate::adapter::{GenerationRequest, OutputDescriptor, SyncGeneration};
use crate::error::ProviderError;
use crate::http::parse_json;

/// HTTP client for a synchronous image-generation API.
pub struct ImageApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Response of the `POST /v1/images/generations` endpoint.
#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    /// Hosted artifact URL, when the provider stores outputs itself.
    url: Option<String>,
    /// Inline payload, when the provider returns bytes directly.
    b64_json: Option<String>,
}

impl ImageApiClient {
    /// Create a new client.
    ///
    /// * `base_url` - e.g. `https://api.provider.example`.
    /// * `api_key`  - bearer token, if the deployment requires one.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`] for
    /// connection pooling across providers.
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
}

#[async_trait::async_trait]
impl SyncGeneration for ImageApiClient {
    async fn generate_one(
        &self,
        request: &GenerationRequest,
        index: u32,
    ) -> Result<OutputDescriptor, ProviderError> {
        let (width, height) = resolve_dimensions(&request.aspect_ratio);

        let body = serde_json::json!({
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "width": width,
            "height": height,
            "reference_image": request.reference_image,
            "parameters": request.parameters,
        });

        let response = self
            .authed(
                self.client
                    .post(format!("{}/v1/images/generations", self.base_url)),
            )
            .json(&body)
            .send()
            .await?;

        let parsed: ImageGenerationResponse = parse_json(response).await?;

        let content_ref = parsed.url.or(parsed.b64_json).ok_or_else(|| {
            ProviderError::MissingResult(format!(
                "image response for output {index} had neither url nor payload"
            ))
        })?;

        Ok(OutputDescriptor {
            content_ref,
            kind: ContentKind::Image,
            width: Some(width as i32),
            height: Some(height as i32),
            duration_secs: None,
        })
    }
}
