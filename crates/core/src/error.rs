use crate::types::DbId;

/// Domain error taxonomy for the generation pipeline.
///
/// Every failure mode the orchestration core can hit maps to one of these
/// variants. Adapter- and materializer-level errors are converted into
/// `Provider`/`TimedOut`/`Storage` before they cross the worker boundary,
/// so callers only ever observe this taxonomy (or the job's persisted
/// diagnostics).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Provider call failed: {0}")]
    Provider(String),

    #[error("Operation timed out: {0}")]
    TimedOut(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Storage failed: {0}")]
    Storage(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
