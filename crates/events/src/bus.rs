//! In-process event bus backed by a `tokio::sync::broadcast` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use atelier_core::types::DbId;

// Event type names published by the core. Dot-separated, entity first.
pub const EVENT_JOB_CREATED: &str = "generation.created";
pub const EVENT_JOB_COMPLETED: &str = "generation.completed";
pub const EVENT_JOB_FAILED: &str = "generation.failed";
pub const EVENT_JOB_RECONCILED: &str = "generation.reconciled";

/// A job lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"generation.completed"`.
    pub event_type: String,

    /// The job the event concerns.
    pub job_id: DbId,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Create a new event with an empty payload.
    pub fn new(event_type: impl Into<String>, job_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            job_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so any number of subscribers can
/// independently receive every published [`JobEvent`]. Publishing with no
/// live subscribers is not an error - the event is simply dropped.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        let event_type = event.event_type.clone();
        let job_id = event.job_id;
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event_type = %event_type, job_id, receivers, "Event published");
            }
            Err(_) => {
                tracing::debug!(event_type = %event_type, job_id, "Event published with no subscribers");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
