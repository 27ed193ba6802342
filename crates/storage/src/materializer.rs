//! Output materialization: normalize provider content into durable storage.
//!
//! Every output lands at the deterministic path
//! `{user_id}/{job_id}/{index}.{ext}` in the bucket for its content kind.
//! Failure policy differs by source: an inline payload that cannot be
//! stored is fatal for that output (no usable source remains), while an
//! external URL that cannot be re-hosted degrades to referencing the
//! original URL - observable via the `durable` flag and a WARN log, never
//! silent.

use std::sync::Arc;

use atelier_core::types::DbId;
use atelier_db::models::status::ContentKind;
use atelier_providers::adapter::OutputDescriptor;
use atelier_providers::payload::{decode_inline, ContentRef};

use crate::error::StorageError;
use crate::store::{extension_for_mime, https_equivalent, ObjectStore};

/// Bucket names per content kind.
#[derive(Debug, Clone)]
pub struct StorageBuckets {
    pub images: String,
    pub videos: String,
}

/// One materialized output, ready to persist as an output record.
#[derive(Debug, Clone)]
pub struct MaterializedOutput {
    pub url: String,
    /// False when the output references the original external URL
    /// because re-hosting failed.
    pub durable: bool,
    /// Human-readable degradation note for the job diagnostics.
    pub warning: Option<String>,
}

/// Normalizes adapter output descriptors into the object store.
pub struct Materializer {
    store: Arc<dyn ObjectStore>,
    buckets: StorageBuckets,
}

impl Materializer {
    pub fn new(store: Arc<dyn ObjectStore>, buckets: StorageBuckets) -> Self {
        Self { store, buckets }
    }

    fn bucket_and_ext(&self, kind: ContentKind) -> (&str, &'static str) {
        match kind {
            ContentKind::Image => (self.buckets.images.as_str(), "png"),
            ContentKind::Video => (self.buckets.videos.as_str(), "mp4"),
        }
    }

    /// Deterministic object key for one output of a job.
    pub fn object_key(user_id: DbId, job_id: DbId, index: i32, ext: &str) -> String {
        format!("{user_id}/{job_id}/{index}.{ext}")
    }

    /// Materialize one output descriptor.
    pub async fn materialize(
        &self,
        descriptor: &OutputDescriptor,
        user_id: DbId,
        job_id: DbId,
        index: i32,
    ) -> Result<MaterializedOutput, StorageError> {
        let (bucket, ext) = self.bucket_and_ext(descriptor.kind);
        let key = Self::object_key(user_id, job_id, index, ext);

        match ContentRef::classify(&descriptor.content_ref) {
            ContentRef::Inline(payload) => {
                let (bytes, mime) =
                    decode_inline(&payload).map_err(|e| StorageError::Decode(e.to_string()))?;
                let url = self.store.put_bytes(bucket, &key, bytes, &mime).await?;
                Ok(MaterializedOutput {
                    url,
                    durable: true,
                    warning: None,
                })
            }

            ContentRef::Url(source_url) => {
                match self.store.put_from_url(bucket, &key, &source_url).await {
                    Ok(url) => Ok(MaterializedOutput {
                        url,
                        durable: true,
                        warning: None,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            job_id,
                            index,
                            error = %e,
                            source_url = %source_url,
                            "Materialization failed, falling back to the external URL"
                        );
                        Ok(MaterializedOutput {
                            url: source_url,
                            durable: false,
                            warning: Some(format!(
                                "output {index} not re-hosted, serving from external URL: {e}"
                            )),
                        })
                    }
                }
            }

            ContentRef::CloudUri(uri) => {
                match self.store.copy_object(bucket, &key, &uri).await {
                    Ok(url) => Ok(MaterializedOutput {
                        url,
                        durable: true,
                        warning: None,
                    }),
                    Err(e) => match https_equivalent(&uri) {
                        Some(url) => {
                            tracing::warn!(
                                job_id,
                                index,
                                error = %e,
                                source_uri = %uri,
                                "Cloud object copy failed, falling back to the public URL"
                            );
                            Ok(MaterializedOutput {
                                url,
                                durable: false,
                                warning: Some(format!(
                                    "output {index} not copied, serving from provider storage: {e}"
                                )),
                            })
                        }
                        None => Err(e),
                    },
                }
            }
        }
    }

    /// Persist an inline reference image so later steps can cite a
    /// stable URL. Fatal on failure - unlike outputs, the reference has
    /// no external fallback location.
    pub async fn persist_reference(
        &self,
        payload: &str,
        user_id: DbId,
        job_id: DbId,
    ) -> Result<String, StorageError> {
        let (bytes, mime) =
            decode_inline(payload).map_err(|e| StorageError::Decode(e.to_string()))?;
        let key = format!("{user_id}/{job_id}/reference.{}", extension_for_mime(&mime));
        self.store
            .put_bytes(&self.buckets.images, &key, bytes, &mime)
            .await
    }
}
