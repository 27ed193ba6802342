//! Handlers for the `/generations` resource.
//!
//! Routes:
//! - `POST /generations`                   - create a job and dispatch it
//! - `GET  /generations`                   - list jobs
//! - `GET  /generations/{id}`              - job with its outputs
//! - `POST /generations/{id}/process`      - internal trigger target
//! - `GET  /generations/{id}/diagnostics`  - diagnostic read
//! - `POST /generations/{id}/fail`         - administrative mark-as-failed

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use atelier_core::diagnostics::DiagnosticUpdate;
use atelier_core::error::CoreError;
use atelier_core::generation::{age_secs, validate_generation_request, DEFAULT_OUTPUT_COUNT};
use atelier_core::types::DbId;
use atelier_db::models::generation::{
    CreateGenerationJob, CreateGenerationRequest, DiagnosticsView, FailGenerationRequest,
    GenerationDetail, GenerationJob, GenerationListQuery, GenerationStatusResponse,
};
use atelier_db::models::status::JobStatus;
use atelier_events::bus::{JobEvent, EVENT_JOB_CREATED, EVENT_JOB_FAILED};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Header the authenticating gateway uses to convey the caller.
const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, as injected by the auth layer in front of this
/// service.
fn caller_id(headers: &HeaderMap) -> AppResult<DbId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            AppError::BadRequest(format!("missing or invalid {USER_ID_HEADER} header"))
        })
}

/// Load a job or map its absence to a 404.
async fn find_job(state: &AppState, job_id: DbId) -> AppResult<GenerationJob> {
    state
        .job_store
        .load(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "GenerationJob",
            id: job_id,
        }))
}

fn status_of(job: &GenerationJob) -> AppResult<JobStatus> {
    JobStatus::from_id(job.status_id).ok_or_else(|| {
        AppError::InternalError(format!("job {} has unknown status {}", job.id, job.status_id))
    })
}

// ---------------------------------------------------------------------------
// Create and dispatch
// ---------------------------------------------------------------------------

/// POST /api/v1/generations
///
/// Validates the request, creates the job record in `Processing`, hands
/// the id to the dispatcher, and returns immediately - generation
/// happens out-of-band. Validation failures create no job.
pub async fn create_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateGenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = caller_id(&headers)?;
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let parameters = input.parameters.clone().unwrap_or_else(|| json!({}));
    let output_count = parameters
        .get("num_outputs")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(DEFAULT_OUTPUT_COUNT);
    validate_generation_request(&input.prompt, output_count).map_err(AppError::Core)?;

    if !state.registry.contains(&input.model_id) {
        return Err(AppError::Core(CoreError::UnknownModel(input.model_id)));
    }

    let job = state
        .job_store
        .create(&CreateGenerationJob {
            user_id,
            session_id: input.session_id,
            model_id: input.model_id,
            prompt: input.prompt,
            negative_prompt: input.negative_prompt,
            reference_image: input.reference_image,
            parameters,
        })
        .await?;

    tracing::info!(
        job_id = job.id,
        model_id = %job.model_id,
        user_id,
        "Generation job created",
    );
    state.event_bus.publish(
        JobEvent::new(EVENT_JOB_CREATED, job.id)
            .with_payload(json!({ "model_id": job.model_id })),
    );
    state.dispatcher.dispatch(job.id);

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: GenerationStatusResponse {
                id: job.id,
                status: JobStatus::Processing.as_str(),
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Processing trigger
// ---------------------------------------------------------------------------

/// POST /api/v1/generations/{id}/process
///
/// Internal trigger target: runs the full generate → materialize →
/// finalize sequence and returns the final status. Safe to call on a
/// terminal job - the existing status is reported unchanged.
pub async fn process_generation(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = state
        .processor
        .process_job(job_id)
        .await
        .map_err(AppError::Core)?;

    Ok(Json(DataResponse {
        data: GenerationStatusResponse {
            id: job_id,
            status: status.as_str(),
        },
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/generations
pub async fn list_generations(
    State(state): State<AppState>,
    Query(params): Query<GenerationListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.job_store.list(&params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/generations/{id}
pub async fn get_generation(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, job_id).await?;
    let outputs = state.job_store.outputs(job_id).await?;
    Ok(Json(DataResponse {
        data: GenerationDetail { job, outputs },
    }))
}

/// GET /api/v1/generations/{id}/diagnostics
///
/// The immutable request parameters and the mutable diagnostic
/// side-channel are combined here, at the read boundary.
pub async fn get_diagnostics(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, job_id).await?;
    let status = status_of(&job)?;
    let output_count = state.job_store.count_outputs(job_id).await?;

    Ok(Json(DataResponse {
        data: DiagnosticsView {
            id: job.id,
            status: status.as_str(),
            output_count,
            age_secs: age_secs(job.created_at, Utc::now()),
            parameters: job.parameters,
            diagnostics: job.diagnostics,
            debug_logs: job.debug_logs,
        },
    }))
}

// ---------------------------------------------------------------------------
// Administrative fail
// ---------------------------------------------------------------------------

/// POST /api/v1/generations/{id}/fail
///
/// Marks a `Processing` job failed with an operator-supplied reason.
/// Does not stop in-flight provider work - the worker's finalize becomes
/// a no-op instead. 409 when the job is already terminal.
pub async fn fail_generation(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<FailGenerationRequest>,
) -> AppResult<impl IntoResponse> {
    find_job(&state, job_id).await?;

    let reason = input
        .reason
        .unwrap_or_else(|| "marked failed by operator".to_string());
    let update = DiagnosticUpdate::new()
        .error(&reason)
        .log(format!("operator: {reason}"));

    let failed = state.job_store.fail(job_id, update).await?;
    if !failed {
        return Err(AppError::Core(CoreError::Conflict(
            "Job is already in a terminal state".into(),
        )));
    }

    state.event_bus.publish(
        JobEvent::new(EVENT_JOB_FAILED, job_id).with_payload(json!({ "reason": reason })),
    );

    Ok(Json(DataResponse {
        data: GenerationStatusResponse {
            id: job_id,
            status: JobStatus::Failed.as_str(),
        },
    }))
}
