//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the API surface that owns the entity

pub mod event;
pub mod generation;
pub mod output;
pub mod status;
