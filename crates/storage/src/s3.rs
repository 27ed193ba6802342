//! S3-backed object store.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StorageError;
use crate::store::{https_equivalent, ObjectStore};

/// Object store backed by S3 (or an S3-compatible endpoint).
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    http: reqwest::Client,
    /// Overrides the default `https://{bucket}.s3.amazonaws.com` URL
    /// scheme, for CDN fronting or S3-compatible deployments.
    public_base_url: Option<String>,
}

impl S3ObjectStore {
    /// Build a store from ambient AWS configuration (env, profile, IMDS).
    pub async fn from_env(public_base_url: Option<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            http: reqwest::Client::new(),
            public_base_url,
        }
    }

    /// Build a store from an explicit SDK client (tests, custom config).
    pub fn with_client(client: aws_sdk_s3::Client, public_base_url: Option<String>) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            public_base_url,
        }
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{bucket}/{key}"),
            None => format!("https://{bucket}.s3.amazonaws.com/{key}"),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        Ok(self.public_url(bucket, key))
    }

    async fn put_from_url(
        &self,
        bucket: &str,
        key: &str,
        url: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::Fetch(e.to_string()))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Fetch(e.to_string()))?;

        self.put_bytes(bucket, key, bytes.to_vec(), &content_type)
            .await
    }

    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source_uri: &str,
    ) -> Result<String, StorageError> {
        // Same-provider copies stay server-side; anything else goes
        // through its public HTTPS form.
        if let Some(rest) = source_uri.strip_prefix("s3://") {
            self.client
                .copy_object()
                .bucket(bucket)
                .key(key)
                .copy_source(rest)
                .send()
                .await
                .map_err(|e| StorageError::Upload(e.to_string()))?;
            return Ok(self.public_url(bucket, key));
        }

        match https_equivalent(source_uri) {
            Some(url) => self.put_from_url(bucket, key, &url).await,
            None => Err(StorageError::UnsupportedSource(source_uri.to_string())),
        }
    }
}
