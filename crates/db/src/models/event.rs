//! Job event audit rows.

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use atelier_core::types::{DbId, Timestamp};

/// A row from the `job_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobEventRow {
    pub id: DbId,
    pub event_type: String,
    pub job_id: Option<DbId>,
    pub payload: Value,
    pub created_at: Timestamp,
}
