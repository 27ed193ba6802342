//! Durable object storage and output materialization.
//!
//! Provider-returned content (inline payloads, external URLs, cloud
//! object URIs) is normalized into this system's own buckets at
//! deterministic paths. The [`ObjectStore`] trait is the backend seam;
//! S3 and local-filesystem implementations ship here.

pub mod error;
pub mod local;
pub mod materializer;
pub mod s3;
pub mod store;

pub use error::StorageError;
pub use materializer::{MaterializedOutput, Materializer, StorageBuckets};
pub use store::ObjectStore;
