//! Shared domain types and pure generation logic.
//!
//! This crate has no internal dependencies. Everything here is either a
//! type alias, an error taxonomy, or a pure function - no IO, no database,
//! no HTTP.

pub mod diagnostics;
pub mod error;
pub mod generation;
pub mod types;
