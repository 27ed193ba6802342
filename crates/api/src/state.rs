use std::sync::Arc;

use atelier_events::EventBus;
use atelier_providers::ProviderRegistry;
use atelier_worker::{JobStore, Processor};

use crate::background::reconciler::Reconciler;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable - every field is behind `Arc`. All job data flows
/// through the [`JobStore`] port; handlers never touch the database pool
/// directly.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Model id → provider adapter registry, built at startup.
    pub registry: Arc<ProviderRegistry>,
    /// Storage port for jobs and outputs.
    pub job_store: Arc<dyn JobStore>,
    /// Out-of-band trigger with retry/backoff.
    pub dispatcher: Arc<Dispatcher>,
    /// Runs the full generate → materialize → finalize sequence.
    pub processor: Arc<Processor>,
    /// Resolves jobs stuck in a non-terminal state.
    pub reconciler: Arc<Reconciler>,
    /// Job lifecycle event bus.
    pub event_bus: Arc<EventBus>,
}
