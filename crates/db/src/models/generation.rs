//! Generation job entity and the DTOs of the generation API surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

use atelier_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationJob {
    pub id: DbId,
    pub user_id: DbId,
    pub session_id: DbId,
    pub model_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Inline base64 payload or URL, as submitted. Immutable.
    pub reference_image: Option<String>,
    /// Free-form request parameters (aspect ratio, output count, duration,
    /// resolution, ...). Written once at creation.
    pub parameters: Value,
    pub status_id: StatusId,
    /// Worker that holds the processing claim, if any.
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    /// Mergeable diagnostic map. Every write merges; nothing is dropped.
    pub diagnostics: Value,
    /// Append-only debug log.
    pub debug_logs: Value,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Insert payload for a new job. Built by the request handler after
/// validation; the row always starts in `Processing`.
#[derive(Debug, Clone)]
pub struct CreateGenerationJob {
    pub user_id: DbId,
    pub session_id: DbId,
    pub model_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub reference_image: Option<String>,
    pub parameters: Value,
}

/// Request body for `POST /api/v1/generations`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGenerationRequest {
    pub session_id: DbId,
    #[validate(length(min = 1, message = "model_id must not be empty"))]
    pub model_id: String,
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub reference_image: Option<String>,
    /// Free-form parameter map. Recognised keys: `num_outputs`,
    /// `aspect_ratio`, `duration_secs`, `resolution`.
    pub parameters: Option<Value>,
}

/// Response for `POST /api/v1/generations` and the processing trigger.
#[derive(Debug, Serialize)]
pub struct GenerationStatusResponse {
    pub id: DbId,
    pub status: &'static str,
}

/// Query parameters for `GET /api/v1/generations`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerationListQuery {
    pub session_id: Option<DbId>,
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Response for `GET /api/v1/generations/{id}`.
#[derive(Debug, Serialize)]
pub struct GenerationDetail {
    pub job: GenerationJob,
    pub outputs: Vec<super::output::GenerationOutput>,
}

/// Request body for the administrative `POST /generations/{id}/fail`.
#[derive(Debug, Clone, Deserialize)]
pub struct FailGenerationRequest {
    pub reason: Option<String>,
}

/// Response for `POST /api/v1/reconcile`.
#[derive(Debug, Serialize)]
pub struct ReconcileSweepResponse {
    pub failed_ids: Vec<DbId>,
    pub count: usize,
}

/// Response for `GET /api/v1/generations/{id}/diagnostics`.
///
/// The immutable parameters and the mutable diagnostic side-channel are
/// stored separately and combined only here, at the read boundary.
#[derive(Debug, Serialize)]
pub struct DiagnosticsView {
    pub id: DbId,
    pub status: &'static str,
    pub output_count: i64,
    pub age_secs: i64,
    pub parameters: Value,
    pub diagnostics: Value,
    pub debug_logs: Value,
}
