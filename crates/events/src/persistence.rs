//! Durable event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and writes every received [`JobEvent`] to the
//! `job_events` table. It runs as a long-lived background task and shuts
//! down when the bus sender is dropped.

use tokio::sync::broadcast;

use atelier_db::repositories::JobEventRepo;
use atelier_db::DbPool;

use crate::bus::JobEvent;

/// Background service that persists job events to the database.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop.
    ///
    /// The loop exits when the channel is closed (i.e. the bus is
    /// dropped). A failed insert is logged and does not stop the loop.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<JobEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let result = JobEventRepo::insert(
                        &pool,
                        &event.event_type,
                        Some(event.job_id),
                        &event.payload,
                    )
                    .await;

                    if let Err(e) = result {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            job_id = event.job_id,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }
}
