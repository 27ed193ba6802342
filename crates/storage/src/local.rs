//! Local-filesystem object store, for development and tests.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{https_equivalent, ObjectStore};

/// Object store writing under a base directory, serving objects from a
/// configured base URL (typically a static-file route of the API).
pub struct LocalObjectStore {
    base_dir: PathBuf,
    base_url: String,
    http: reqwest::Client,
}

impl LocalObjectStore {
    pub fn new(base_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base_dir.join(bucket).join(key)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.base_url)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Upload(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Fetch(e.to_string()))?;

        self.put_bytes(bucket, key, bytes.to_vec(), "application/octet-stream")
            .await
    }

    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source_uri: &str,
    ) -> Result<String, StorageError> {
        match https_equivalent(source_uri) {
            Some(url) => self.put_from_url(bucket, key, &url).await,
            None => Err(StorageError::UnsupportedSource(source_uri.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_bytes_writes_under_bucket_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost:3000/objects");

        let url = store
            .put_bytes("images", "7/42/0.png", b"png-bytes".to_vec(), "image/png")
            .await
            .unwrap();

        assert_eq!(url, "http://localhost:3000/objects/images/7/42/0.png");
        let written = std::fs::read(dir.path().join("images/7/42/0.png")).unwrap();
        assert_eq!(written, b"png-bytes");
    }

    #[tokio::test]
    async fn copy_object_rejects_unknown_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost:3000/objects");

        let err = store
            .copy_object("images", "a/b/0.png", "ftp://host/file")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedSource(_)));
    }
}
