//! Repository for the `generation_jobs` table.
//!
//! All state transitions are guarded in SQL: `complete_with_outputs` and
//! `fail` only touch rows still in `Processing`, so a record leaves the
//! non-terminal state exactly once no matter how many callers race.
//! Diagnostic writes use `jsonb ||` so concurrent writers merge instead
//! of overwriting.

use sqlx::PgPool;

use atelier_core::types::DbId;

use crate::models::generation::{CreateGenerationJob, GenerationJob, GenerationListQuery};
use crate::models::output::NewGenerationOutput;
use crate::models::status::JobStatus;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, user_id, session_id, model_id, prompt, negative_prompt, \
    reference_image, parameters, status_id, claimed_by, claimed_at, \
    diagnostics, debug_logs, created_at, completed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and transition operations for generation jobs.
pub struct GenerationJobRepo;

impl GenerationJobRepo {
    /// Insert a new job in `Processing` state.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGenerationJob,
    ) -> Result<GenerationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_jobs \
                 (user_id, session_id, model_id, prompt, negative_prompt, \
                  reference_image, parameters, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(input.user_id)
            .bind(input.session_id)
            .bind(&input.model_id)
            .bind(&input.prompt)
            .bind(&input.negative_prompt)
            .bind(&input.reference_image)
            .bind(&input.parameters)
            .bind(JobStatus::Processing.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically take the processing claim for a job.
    ///
    /// Succeeds only for an unclaimed row still in `Processing`, so two
    /// workers racing on the same id cannot both start adapter work.
    /// Returns the claimed row, or `None` if the job is terminal or
    /// already claimed.
    pub async fn claim(
        pool: &PgPool,
        id: DbId,
        worker_id: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_jobs \
             SET claimed_by = $2, claimed_at = NOW() \
             WHERE id = $1 AND status_id = $3 AND claimed_by IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(id)
            .bind(worker_id)
            .bind(JobStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }

    /// Transition `Processing -> Failed`, merging diagnostic entries and
    /// appending debug log lines in the same statement.
    ///
    /// Returns `false` (no-op) if the job already left `Processing`.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        entries: &serde_json::Value,
        logs: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, completed_at = NOW(), \
                 diagnostics = diagnostics || $4::jsonb, \
                 debug_logs = debug_logs || $5::jsonb \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Processing.id())
        .bind(entries)
        .bind(logs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition `Processing -> Completed` and insert the job's output
    /// rows in one transaction.
    ///
    /// Outputs exist iff the job is `Completed`: if the guarded UPDATE
    /// matches no row (the job already turned terminal, e.g. via the
    /// reconciler), nothing is inserted and `false` is returned.
    pub async fn complete_with_outputs(
        pool: &PgPool,
        id: DbId,
        outputs: &[NewGenerationOutput],
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            "UPDATE generation_jobs \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Processing.id())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for output in outputs {
            sqlx::query(
                "INSERT INTO generation_outputs \
                     (job_id, output_index, url, content_kind, width, height, \
                      duration_secs, durable) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(output.job_id)
            .bind(output.output_index)
            .bind(&output.url)
            .bind(output.content_kind)
            .bind(output.width)
            .bind(output.height)
            .bind(output.duration_secs)
            .bind(output.durable)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Merge entries into the diagnostic map and append debug log lines.
    ///
    /// Additive by construction: `jsonb ||` keeps every key not named in
    /// `entries`, and the log concat never removes earlier lines.
    pub async fn merge_diagnostics(
        pool: &PgPool,
        id: DbId,
        entries: &serde_json::Value,
        logs: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_jobs \
             SET diagnostics = diagnostics || $2::jsonb, \
                 debug_logs = debug_logs || $3::jsonb \
             WHERE id = $1",
        )
        .bind(id)
        .bind(entries)
        .bind(logs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Jobs still `Processing` that are older than `threshold_secs`.
    pub async fn list_stale(
        pool: &PgPool,
        threshold_secs: f64,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE status_id = $1 \
               AND created_at < NOW() - make_interval(secs => $2) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, GenerationJob>(&query)
            .bind(JobStatus::Processing.id())
            .bind(threshold_secs)
            .fetch_all(pool)
            .await
    }

    /// Fail every stale `Processing` job in one statement, merging the
    /// synthetic reconciler diagnostics. Returns the ids transitioned.
    pub async fn fail_stale(
        pool: &PgPool,
        threshold_secs: f64,
        entries: &serde_json::Value,
        logs: &serde_json::Value,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE generation_jobs \
             SET status_id = $2, completed_at = NOW(), \
                 diagnostics = diagnostics || $3::jsonb, \
                 debug_logs = debug_logs || $4::jsonb \
             WHERE status_id = $1 \
               AND created_at < NOW() - make_interval(secs => $5) \
             RETURNING id",
        )
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Failed.id())
        .bind(entries)
        .bind(logs)
        .bind(threshold_secs)
        .fetch_all(pool)
        .await
    }

    /// List jobs with optional session/status filters and pagination.
    pub async fn list(
        pool: &PgPool,
        params: &GenerationListQuery,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.session_id.is_some() {
            conditions.push(format!("session_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, GenerationJob>(&query);
        if let Some(sid) = params.session_id {
            q = q.bind(sid);
        }
        if let Some(status) = params.status_id {
            q = q.bind(status);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }
}
