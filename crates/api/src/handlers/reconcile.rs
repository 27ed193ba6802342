//! Handlers for the `/reconcile` resource.
//!
//! Routes:
//! - `GET  /reconcile/stale` - list currently-stale jobs
//! - `POST /reconcile`       - bulk fix: fail every stale job
//! - `POST /reconcile/{id}`  - fix a single stuck job

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use atelier_core::error::CoreError;
use atelier_core::types::DbId;
use atelier_db::models::generation::{GenerationStatusResponse, ReconcileSweepResponse};
use atelier_db::models::status::JobStatus;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/reconcile/stale
pub async fn list_stale(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state
        .job_store
        .list_stale(state.reconciler.threshold_secs())
        .await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// POST /api/v1/reconcile
///
/// Fail every stale `Processing` job in one sweep.
pub async fn reconcile_all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let failed_ids = state.reconciler.sweep().await?;
    let count = failed_ids.len();
    Ok(Json(DataResponse {
        data: ReconcileSweepResponse { failed_ids, count },
    }))
}

/// POST /api/v1/reconcile/{id}
///
/// Fix one stuck job. 404 when the job does not exist, 409 when it is
/// already terminal.
pub async fn reconcile_one(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let fixed = state.reconciler.fix_one(job_id).await?;

    if !fixed {
        return match state.job_store.load(job_id).await? {
            None => Err(AppError::Core(CoreError::NotFound {
                entity: "GenerationJob",
                id: job_id,
            })),
            Some(_) => Err(AppError::Core(CoreError::Conflict(
                "Job is already in a terminal state".into(),
            ))),
        };
    }

    Ok(Json(DataResponse {
        data: GenerationStatusResponse {
            id: job_id,
            status: JobStatus::Failed.as_str(),
        },
    }))
}
