//! Route definitions for the `/reconcile` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::reconcile;
use crate::state::AppState;

/// Routes mounted at `/reconcile`.
///
/// ```text
/// GET    /stale   -> list_stale
/// POST   /        -> reconcile_all
/// POST   /{id}    -> reconcile_one
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(reconcile::reconcile_all))
        .route("/stale", get(reconcile::list_stale))
        .route("/{id}", post(reconcile::reconcile_one))
}
