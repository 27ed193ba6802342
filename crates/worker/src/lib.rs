//! The processing worker: job store port, processing pipeline, and the
//! queue-fed worker pool.
//!
//! Processing is idempotent per job id - re-entrant calls on a terminal
//! record are a safe no-op, and an atomic claim prevents two workers from
//! doing adapter work for the same job.

pub mod pool;
pub mod processor;
pub mod store;

pub use pool::{job_queue, JobTrigger, QueueTrigger, TriggerError, WorkerPool};
pub use processor::Processor;
pub use store::{InMemoryJobStore, JobStore, PgJobStore};
