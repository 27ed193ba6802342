//! The job store port.
//!
//! The orchestration core only ever touches the relational store through
//! this trait: create, read, claim, finalize, merge diagnostics, list.
//! [`PgJobStore`] delegates to the repositories; [`InMemoryJobStore`]
//! backs tests and DB-less development with the same semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use atelier_core::diagnostics::{append_logs, merge_map, DiagnosticUpdate};
use atelier_core::error::CoreError;
use atelier_core::generation::is_stale;
use atelier_core::types::DbId;
use atelier_db::models::generation::{
    CreateGenerationJob, GenerationJob, GenerationListQuery,
};
use atelier_db::models::output::{GenerationOutput, NewGenerationOutput};
use atelier_db::models::status::JobStatus;
use atelier_db::repositories::{GenerationJobRepo, OutputRepo};
use atelier_db::DbPool;

/// Storage port for generation jobs and their outputs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `Processing` state.
    async fn create(&self, input: &CreateGenerationJob) -> Result<GenerationJob, CoreError>;

    /// Load a job by id.
    async fn load(&self, id: DbId) -> Result<Option<GenerationJob>, CoreError>;

    /// Atomically take the processing claim. `None` when the job is
    /// terminal or already claimed.
    async fn claim(&self, id: DbId, worker_id: &str)
        -> Result<Option<GenerationJob>, CoreError>;

    /// Transition to `Completed` and insert outputs atomically. `false`
    /// when the job already left `Processing` (nothing is inserted).
    async fn complete_with_outputs(
        &self,
        id: DbId,
        outputs: &[NewGenerationOutput],
    ) -> Result<bool, CoreError>;

    /// Transition to `Failed`, merging the update's diagnostics. `false`
    /// when the job already left `Processing`.
    async fn fail(&self, id: DbId, update: DiagnosticUpdate) -> Result<bool, CoreError>;

    /// Merge diagnostic entries and append debug log lines. Additive.
    async fn merge_diagnostics(
        &self,
        id: DbId,
        update: DiagnosticUpdate,
    ) -> Result<(), CoreError>;

    /// Outputs of a job, ordered by output index.
    async fn outputs(&self, job_id: DbId) -> Result<Vec<GenerationOutput>, CoreError>;

    /// Number of persisted outputs for a job.
    async fn count_outputs(&self, job_id: DbId) -> Result<i64, CoreError>;

    /// List jobs with optional filters and pagination.
    async fn list(&self, query: &GenerationListQuery)
        -> Result<Vec<GenerationJob>, CoreError>;

    /// Jobs still `Processing` older than `threshold_secs`.
    async fn list_stale(&self, threshold_secs: i64)
        -> Result<Vec<GenerationJob>, CoreError>;

    /// Fail every stale `Processing` job, merging `update` into each.
    /// Returns the ids transitioned.
    async fn fail_stale(
        &self,
        threshold_secs: i64,
        update: DiagnosticUpdate,
    ) -> Result<Vec<DbId>, CoreError>;
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("database error: {e}"))
}

fn update_parts(update: DiagnosticUpdate) -> (Value, Value) {
    let entries = Value::Object(update.entries);
    let logs = Value::Array(update.logs.into_iter().map(Value::String).collect());
    (entries, logs)
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by Postgres via the repository layer.
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &CreateGenerationJob) -> Result<GenerationJob, CoreError> {
        GenerationJobRepo::create(&self.pool, input)
            .await
            .map_err(db_err)
    }

    async fn load(&self, id: DbId) -> Result<Option<GenerationJob>, CoreError> {
        GenerationJobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_err)
    }

    async fn claim(
        &self,
        id: DbId,
        worker_id: &str,
    ) -> Result<Option<GenerationJob>, CoreError> {
        GenerationJobRepo::claim(&self.pool, id, worker_id)
            .await
            .map_err(db_err)
    }

    async fn complete_with_outputs(
        &self,
        id: DbId,
        outputs: &[NewGenerationOutput],
    ) -> Result<bool, CoreError> {
        GenerationJobRepo::complete_with_outputs(&self.pool, id, outputs)
            .await
            .map_err(db_err)
    }

    async fn fail(&self, id: DbId, update: DiagnosticUpdate) -> Result<bool, CoreError> {
        let (entries, logs) = update_parts(update);
        GenerationJobRepo::fail(&self.pool, id, &entries, &logs)
            .await
            .map_err(db_err)
    }

    async fn merge_diagnostics(
        &self,
        id: DbId,
        update: DiagnosticUpdate,
    ) -> Result<(), CoreError> {
        if update.is_empty() {
            return Ok(());
        }
        let (entries, logs) = update_parts(update);
        GenerationJobRepo::merge_diagnostics(&self.pool, id, &entries, &logs)
            .await
            .map_err(db_err)
    }

    async fn outputs(&self, job_id: DbId) -> Result<Vec<GenerationOutput>, CoreError> {
        OutputRepo::list_by_job(&self.pool, job_id)
            .await
            .map_err(db_err)
    }

    async fn count_outputs(&self, job_id: DbId) -> Result<i64, CoreError> {
        OutputRepo::count_by_job(&self.pool, job_id)
            .await
            .map_err(db_err)
    }

    async fn list(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<GenerationJob>, CoreError> {
        GenerationJobRepo::list(&self.pool, query)
            .await
            .map_err(db_err)
    }

    async fn list_stale(
        &self,
        threshold_secs: i64,
    ) -> Result<Vec<GenerationJob>, CoreError> {
        GenerationJobRepo::list_stale(&self.pool, threshold_secs as f64)
            .await
            .map_err(db_err)
    }

    async fn fail_stale(
        &self,
        threshold_secs: i64,
        update: DiagnosticUpdate,
    ) -> Result<Vec<DbId>, CoreError> {
        let (entries, logs) = update_parts(update);
        GenerationJobRepo::fail_stale(&self.pool, threshold_secs as f64, &entries, &logs)
            .await
            .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryState {
    jobs: HashMap<DbId, GenerationJob>,
    outputs: Vec<GenerationOutput>,
    next_job_id: DbId,
    next_output_id: DbId,
}

/// [`JobStore`] held entirely in memory.
///
/// Implements the same transition guards and additive diagnostic merge
/// as the Postgres store. Used by unit and router tests, and usable for
/// DB-less local development.
#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift a job's creation time into the past. Test helper for
    /// staleness scenarios.
    pub fn backdate(&self, id: DbId, secs: i64) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if let Some(job) = state.jobs.get_mut(&id) {
            job.created_at -= chrono::Duration::seconds(secs);
        }
    }

    fn apply_update(job: &mut GenerationJob, update: DiagnosticUpdate) {
        merge_map(&mut job.diagnostics, &update.entries);
        append_logs(&mut job.debug_logs, &update.logs);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, input: &CreateGenerationJob) -> Result<GenerationJob, CoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.next_job_id += 1;
        let job = GenerationJob {
            id: state.next_job_id,
            user_id: input.user_id,
            session_id: input.session_id,
            model_id: input.model_id.clone(),
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            reference_image: input.reference_image.clone(),
            parameters: input.parameters.clone(),
            status_id: JobStatus::Processing.id(),
            claimed_by: None,
            claimed_at: None,
            diagnostics: serde_json::json!({}),
            debug_logs: serde_json::json!([]),
            created_at: Utc::now(),
            completed_at: None,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn load(&self, id: DbId) -> Result<Option<GenerationJob>, CoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.jobs.get(&id).cloned())
    }

    async fn claim(
        &self,
        id: DbId,
        worker_id: &str,
    ) -> Result<Option<GenerationJob>, CoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status_id != JobStatus::Processing.id() || job.claimed_by.is_some() {
            return Ok(None);
        }
        job.claimed_by = Some(worker_id.to_string());
        job.claimed_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn complete_with_outputs(
        &self,
        id: DbId,
        outputs: &[NewGenerationOutput],
    ) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status_id != JobStatus::Processing.id() {
            return Ok(false);
        }
        job.status_id = JobStatus::Completed.id();
        job.completed_at = Some(Utc::now());

        for output in outputs {
            state.next_output_id += 1;
            let row = GenerationOutput {
                id: state.next_output_id,
                job_id: output.job_id,
                output_index: output.output_index,
                url: output.url.clone(),
                content_kind: output.content_kind,
                width: output.width,
                height: output.height,
                duration_secs: output.duration_secs,
                durable: output.durable,
                starred: false,
                approved: false,
                bookmarked: false,
                created_at: Utc::now(),
            };
            state.outputs.push(row);
        }
        Ok(true)
    }

    async fn fail(&self, id: DbId, update: DiagnosticUpdate) -> Result<bool, CoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status_id != JobStatus::Processing.id() {
            return Ok(false);
        }
        job.status_id = JobStatus::Failed.id();
        job.completed_at = Some(Utc::now());
        Self::apply_update(job, update);
        Ok(true)
    }

    async fn merge_diagnostics(
        &self,
        id: DbId,
        update: DiagnosticUpdate,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if let Some(job) = state.jobs.get_mut(&id) {
            Self::apply_update(job, update);
        }
        Ok(())
    }

    async fn outputs(&self, job_id: DbId) -> Result<Vec<GenerationOutput>, CoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let mut outputs: Vec<GenerationOutput> = state
            .outputs
            .iter()
            .filter(|o| o.job_id == job_id)
            .cloned()
            .collect();
        outputs.sort_by_key(|o| o.output_index);
        Ok(outputs)
    }

    async fn count_outputs(&self, job_id: DbId) -> Result<i64, CoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.outputs.iter().filter(|o| o.job_id == job_id).count() as i64)
    }

    async fn list(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<GenerationJob>, CoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let mut jobs: Vec<GenerationJob> = state
            .jobs
            .values()
            .filter(|j| query.session_id.is_none_or(|sid| j.session_id == sid))
            .filter(|j| query.status_id.is_none_or(|st| j.status_id == st))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.unwrap_or(50).clamp(0, 100) as usize;
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_stale(
        &self,
        threshold_secs: i64,
    ) -> Result<Vec<GenerationJob>, CoreError> {
        let now = Utc::now();
        let state = self.state.lock().expect("store mutex poisoned");
        let mut jobs: Vec<GenerationJob> = state
            .jobs
            .values()
            .filter(|j| j.status_id == JobStatus::Processing.id())
            .filter(|j| is_stale(j.created_at, now, threshold_secs))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn fail_stale(
        &self,
        threshold_secs: i64,
        update: DiagnosticUpdate,
    ) -> Result<Vec<DbId>, CoreError> {
        let now = Utc::now();
        let mut state = self.state.lock().expect("store mutex poisoned");
        let mut failed = Vec::new();
        for job in state.jobs.values_mut() {
            if job.status_id == JobStatus::Processing.id()
                && is_stale(job.created_at, now, threshold_secs)
            {
                job.status_id = JobStatus::Failed.id();
                job.completed_at = Some(now);
                Self::apply_update(job, update.clone());
                failed.push(job.id);
            }
        }
        failed.sort_unstable();
        Ok(failed)
    }
}
