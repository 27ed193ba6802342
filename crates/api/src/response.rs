//! Shared response envelope for API handlers.
//!
//! Every successful response is wrapped in `{ "data": ... }`. Using
//! [`DataResponse`] instead of ad-hoc `json!` keeps the envelope typed
//! and uniform across handlers.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
