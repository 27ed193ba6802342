//! Generation request constants, aspect-ratio resolution, and validation.
//!
//! Pure functions and constants used by the request handler, the provider
//! adapters, and the reconciler. Diagnostic merge semantics live in
//! [`crate::diagnostics`].

use std::time::Duration;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Output count
// ---------------------------------------------------------------------------

/// Number of outputs requested when the caller does not say.
pub const DEFAULT_OUTPUT_COUNT: u32 = 1;

/// Hard ceiling on outputs per request.
pub const MAX_OUTPUT_COUNT: u32 = 8;

// ---------------------------------------------------------------------------
// Aspect ratios
// ---------------------------------------------------------------------------

/// Aspect ratio used when the request omits one or names an unknown ratio.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Fixed lookup table from aspect ratio to output dimensions.
///
/// Synchronous image providers do not report dimensions per call; the
/// adapter infers them from the requested ratio via this table.
const ASPECT_RATIO_DIMENSIONS: &[(&str, (u32, u32))] = &[
    ("1:1", (1024, 1024)),
    ("16:9", (1344, 768)),
    ("9:16", (768, 1344)),
    ("4:3", (1152, 896)),
    ("3:4", (896, 1152)),
];

/// Resolve an aspect ratio string to `(width, height)`.
///
/// Unknown ratios fall back to the `1:1` entry rather than failing - the
/// ratio is a rendering hint, not a validity condition.
pub fn resolve_dimensions(aspect_ratio: &str) -> (u32, u32) {
    ASPECT_RATIO_DIMENSIONS
        .iter()
        .find(|(r, _)| *r == aspect_ratio)
        .or_else(|| {
            ASPECT_RATIO_DIMENSIONS
                .iter()
                .find(|(r, _)| *r == DEFAULT_ASPECT_RATIO)
        })
        .map(|(_, dims)| *dims)
        .expect("default aspect ratio present in table")
}

/// All ratios the table knows about, for error messages and docs.
pub fn known_aspect_ratios() -> Vec<&'static str> {
    ASPECT_RATIO_DIMENSIONS.iter().map(|(r, _)| *r).collect()
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// Validate the user-controlled parts of a generation request.
///
/// The model id is checked against the provider registry by the caller -
/// this function only knows about shape, not about which models exist.
pub fn validate_generation_request(prompt: &str, output_count: u32) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()));
    }
    if output_count == 0 || output_count > MAX_OUTPUT_COUNT {
        return Err(CoreError::Validation(format!(
            "output count must be between 1 and {MAX_OUTPUT_COUNT}, got {output_count}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch retry schedule
// ---------------------------------------------------------------------------

/// Maximum trigger delivery attempts before a job is failed with a
/// dispatch-failure reason.
pub const DISPATCH_MAX_ATTEMPTS: u32 = 3;

/// Linearly increasing delay before retrying a failed trigger delivery.
///
/// Attempt 1 waits 2s, attempt 2 waits 4s, attempt 3 waits 6s.
pub fn dispatch_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2 * u64::from(attempt))
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

/// Age past which a job still in `Processing` is considered stuck.
///
/// Chosen to exceed normal synchronous-adapter latency while staying at
/// the long-running adapter's own poll budget, so the reconciler never
/// fires before the poll loop has had its full window.
pub const STALE_THRESHOLD_SECS: i64 = 300;

/// Whether a job created at `created_at` has exceeded `threshold_secs`.
pub fn is_stale(created_at: Timestamp, now: Timestamp, threshold_secs: i64) -> bool {
    (now - created_at).num_seconds() > threshold_secs
}

/// Age of a record in whole seconds, never negative.
pub fn age_secs(created_at: Timestamp, now: Timestamp) -> i64 {
    (now - created_at).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn known_ratios_resolve_from_table() {
        assert_eq!(resolve_dimensions("1:1"), (1024, 1024));
        assert_eq!(resolve_dimensions("16:9"), (1344, 768));
        assert_eq!(resolve_dimensions("9:16"), (768, 1344));
        assert_eq!(resolve_dimensions("4:3"), (1152, 896));
        assert_eq!(resolve_dimensions("3:4"), (896, 1152));
    }

    #[test]
    fn unknown_ratio_falls_back_to_square() {
        assert_eq!(resolve_dimensions("21:9"), (1024, 1024));
        assert_eq!(resolve_dimensions(""), (1024, 1024));
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let err = validate_generation_request("   ", 1).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn output_count_bounds_are_enforced() {
        assert!(validate_generation_request("a red bicycle", 0).is_err());
        assert!(validate_generation_request("a red bicycle", MAX_OUTPUT_COUNT + 1).is_err());
        assert!(validate_generation_request("a red bicycle", 1).is_ok());
        assert!(validate_generation_request("a red bicycle", MAX_OUTPUT_COUNT).is_ok());
    }

    #[test]
    fn backoff_increases_linearly() {
        assert_eq!(dispatch_backoff(1), Duration::from_secs(2));
        assert_eq!(dispatch_backoff(2), Duration::from_secs(4));
        assert_eq!(dispatch_backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn staleness_respects_threshold() {
        let now = Utc::now();
        let fresh = now - ChronoDuration::seconds(STALE_THRESHOLD_SECS - 10);
        let stale = now - ChronoDuration::seconds(STALE_THRESHOLD_SECS + 10);
        assert!(!is_stale(fresh, now, STALE_THRESHOLD_SECS));
        assert!(is_stale(stale, now, STALE_THRESHOLD_SECS));
    }

    #[test]
    fn age_is_never_negative() {
        let now = Utc::now();
        assert_eq!(age_secs(now + ChronoDuration::seconds(30), now), 0);
        assert_eq!(age_secs(now - ChronoDuration::seconds(30), now), 30);
    }
}
