//! Route definitions for the `/generations` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at `/generations`.
///
/// ```text
/// POST   /                    -> create_generation
/// GET    /                    -> list_generations
/// GET    /{id}                -> get_generation
/// POST   /{id}/process        -> process_generation
/// GET    /{id}/diagnostics    -> get_diagnostics
/// POST   /{id}/fail           -> fail_generation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(generation::list_generations).post(generation::create_generation),
        )
        .route("/{id}", get(generation::get_generation))
        .route("/{id}/process", post(generation::process_generation))
        .route("/{id}/diagnostics", get(generation::get_diagnostics))
        .route("/{id}/fail", post(generation::fail_generation))
}
