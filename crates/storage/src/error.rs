//! Storage-layer error taxonomy.

use atelier_core::error::CoreError;

/// Errors from object storage backends and the materializer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Writing to the durable store failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Fetching the source content failed.
    #[error("Source fetch failed: {0}")]
    Fetch(String),

    /// The inline payload could not be decoded.
    #[error("Payload decode failed: {0}")]
    Decode(String),

    /// The source reference scheme is not materializable.
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::Storage(err.to_string())
    }
}
