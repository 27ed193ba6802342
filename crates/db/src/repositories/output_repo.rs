//! Repository for the `generation_outputs` table.

use sqlx::PgPool;

use atelier_core::types::DbId;

use crate::models::output::{GenerationOutput, NewGenerationOutput};

/// Column list for `generation_outputs` queries.
const COLUMNS: &str = "\
    id, job_id, output_index, url, content_kind, width, height, \
    duration_secs, durable, starred, approved, bookmarked, created_at";

/// Provides CRUD operations for generation outputs.
pub struct OutputRepo;

impl OutputRepo {
    /// Insert one output row.
    pub async fn insert(
        pool: &PgPool,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_outputs \
                 (job_id, output_index, url, content_kind, width, height, \
                  duration_secs, durable) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationOutput>(&query)
            .bind(input.job_id)
            .bind(input.output_index)
            .bind(&input.url)
            .bind(input.content_kind)
            .bind(input.width)
            .bind(input.height)
            .bind(input.duration_secs)
            .bind(input.durable)
            .fetch_one(pool)
            .await
    }

    /// All outputs of a job, ordered by output index.
    pub async fn list_by_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<GenerationOutput>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_outputs \
             WHERE job_id = $1 ORDER BY output_index ASC"
        );
        sqlx::query_as::<_, GenerationOutput>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Number of outputs persisted for a job.
    pub async fn count_by_job(pool: &PgPool, job_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM generation_outputs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(pool)
        .await
    }
}
