//! Route definitions.

pub mod generations;
pub mod health;
pub mod reconcile;

use axum::Router;

use crate::state::AppState;

/// All `/api/v1` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generations", generations::router())
        .nest("/reconcile", reconcile::router())
}
