//! Job lifecycle event bus and durable event persistence.
//!
//! - [`EventBus`] - in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`] - the canonical event envelope for job transitions.
//! - [`EventPersistence`] - background service that writes every event
//!   to the `job_events` table.

pub mod bus;
pub mod persistence;

pub use bus::{EventBus, JobEvent};
pub use persistence::EventPersistence;
