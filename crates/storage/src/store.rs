//! The object storage backend seam.

use async_trait::async_trait;

use crate::error::StorageError;

/// A durable object store addressed by bucket and key.
///
/// Every method returns the public URL of the stored object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store raw bytes.
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Fetch an external URL and store its body.
    async fn put_from_url(
        &self,
        bucket: &str,
        key: &str,
        url: &str,
    ) -> Result<String, StorageError>;

    /// Copy a cloud object (`s3://` / `gs://`) into the store.
    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source_uri: &str,
    ) -> Result<String, StorageError>;
}

/// Translate a cloud object URI into its public HTTPS form, when the
/// scheme has one.
pub fn https_equivalent(uri: &str) -> Option<String> {
    if let Some(rest) = uri.strip_prefix("gs://") {
        let (bucket, key) = rest.split_once('/')?;
        return Some(format!("https://storage.googleapis.com/{bucket}/{key}"));
    }
    if let Some(rest) = uri.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/')?;
        return Some(format!("https://{bucket}.s3.amazonaws.com/{key}"));
    }
    None
}

/// File extension for a stored object, derived from its mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcs_and_s3_uris_translate_to_https() {
        assert_eq!(
            https_equivalent("gs://out/clip.mp4").as_deref(),
            Some("https://storage.googleapis.com/out/clip.mp4")
        );
        assert_eq!(
            https_equivalent("s3://out/img.png").as_deref(),
            Some("https://out.s3.amazonaws.com/img.png")
        );
        assert_eq!(https_equivalent("https://x/y"), None);
        assert_eq!(https_equivalent("gs://no-key"), None);
    }

    #[test]
    fn unknown_mime_maps_to_bin() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }
}
