//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod generation_job_repo;
pub mod job_event_repo;
pub mod output_repo;

pub use generation_job_repo::GenerationJobRepo;
pub use job_event_repo::JobEventRepo;
pub use output_repo::OutputRepo;
