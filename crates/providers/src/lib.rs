//! Provider adapter layer: a uniform interface over heterogeneous
//! third-party generation backends.
//!
//! Two behavioral variants exist, selected per model when the registry is
//! built: synchronous APIs that return an artifact per call, and
//! long-running APIs that return an operation handle which must be polled.
//! Adapters never leak transport errors across the job boundary - every
//! failure mode maps into [`ProviderError`].

pub mod adapter;
pub mod error;
mod http;
pub mod image_api;
pub mod payload;
pub mod registry;
pub mod video_api;

pub use adapter::{
    GenerationOutcome, GenerationRequest, LongRunningGeneration, OperationStatus,
    OutputDescriptor, PollPolicy, ProviderAdapter, SyncGeneration,
};
pub use error::ProviderError;
pub use registry::ProviderRegistry;
