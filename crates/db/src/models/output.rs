//! Generation output entity: one generated artifact of a completed job.

use serde::Serialize;
use sqlx::FromRow;

use atelier_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `generation_outputs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationOutput {
    pub id: DbId,
    pub job_id: DbId,
    pub output_index: i32,
    pub url: String,
    pub content_kind: StatusId,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
    /// False when the materializer fell back to the original external URL
    /// instead of durable storage.
    pub durable: bool,
    pub starred: bool,
    pub approved: bool,
    pub bookmarked: bool,
    pub created_at: Timestamp,
}

/// Insert payload for one output row, produced by the materializer.
#[derive(Debug, Clone)]
pub struct NewGenerationOutput {
    pub job_id: DbId,
    pub output_index: i32,
    pub url: String,
    pub content_kind: StatusId,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
    pub durable: bool,
}
