//! Repository for the `job_events` audit table.

use sqlx::PgPool;

use atelier_core::types::DbId;

use crate::models::event::JobEventRow;

const COLUMNS: &str = "id, event_type, job_id, payload, created_at";

/// Append-only writer/reader for job lifecycle events.
pub struct JobEventRepo;

impl JobEventRepo {
    /// Append one event row.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        job_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO job_events (event_type, job_id, payload) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event_type)
        .bind(job_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Events recorded for one job, oldest first.
    pub async fn list_by_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<JobEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_events WHERE job_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, JobEventRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
