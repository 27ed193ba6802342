//! Additive diagnostic side-channel semantics.
//!
//! Each job carries a mergeable diagnostic map and an append-only debug
//! log, written incrementally by the worker and the reconciler. Writes
//! merge into the existing state - a later write never discards what an
//! earlier one recorded. The Postgres store implements the same semantics
//! with `jsonb ||`; [`merge_map`]/[`append_logs`] are the in-memory
//! reference used by tests and the in-memory job store.

use chrono::Utc;
use serde_json::{json, Map, Value};

// Well-known diagnostic keys. The map is open-ended; these are the ones
// the core itself writes.
pub const KEY_LAST_STEP: &str = "last_step";
pub const KEY_LAST_HEARTBEAT_AT: &str = "last_heartbeat_at";
pub const KEY_ERROR: &str = "error";
pub const KEY_REASON: &str = "reason";
pub const KEY_DETECTED_AT: &str = "detected_at";
pub const KEY_REFERENCE_IMAGE_URL: &str = "reference_image_url";

/// Reason value the reconciler writes for stale jobs.
pub const REASON_TIMEOUT: &str = "timeout";

/// One incremental write to a job's diagnostic side-channel.
///
/// Build with the fluent methods, then hand to the job store's
/// `merge_diagnostics`. An empty update is a no-op.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticUpdate {
    pub entries: Map<String, Value>,
    pub logs: Vec<String>,
}

impl DiagnosticUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the step the worker is currently in and refresh the
    /// heartbeat timestamp.
    pub fn step(mut self, step: &str) -> Self {
        self.entries
            .insert(KEY_LAST_STEP.into(), Value::String(step.into()));
        self.entries.insert(
            KEY_LAST_HEARTBEAT_AT.into(),
            json!(Utc::now().to_rfc3339()),
        );
        self
    }

    /// Record a human-readable failure reason.
    pub fn error(mut self, message: &str) -> Self {
        self.entries
            .insert(KEY_ERROR.into(), Value::String(message.into()));
        self
    }

    /// Arbitrary key/value entry.
    pub fn entry(mut self, key: &str, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Append a line to the debug log.
    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.logs.is_empty()
    }

    /// The synthetic entry the reconciler merges into a stale job.
    pub fn stale_timeout() -> Self {
        let now = Utc::now().to_rfc3339();
        Self::new()
            .entry(KEY_REASON, Value::String(REASON_TIMEOUT.into()))
            .entry(KEY_DETECTED_AT, Value::String(now.clone()))
            .log(format!("reconciler: marked failed at {now}, reason=timeout"))
    }
}

/// Merge `update` entries into `existing`, key by key.
///
/// Keys absent from the update are left untouched; a repeated key takes
/// the newer value. `existing` is coerced to an object if it is not one.
pub fn merge_map(existing: &mut Value, update: &Map<String, Value>) {
    if !existing.is_object() {
        *existing = Value::Object(Map::new());
    }
    let target = existing.as_object_mut().expect("coerced to object above");
    for (k, v) in update {
        target.insert(k.clone(), v.clone());
    }
}

/// Append `logs` to an existing JSON array, coercing non-arrays.
pub fn append_logs(existing: &mut Value, logs: &[String]) {
    if !existing.is_array() {
        *existing = Value::Array(Vec::new());
    }
    let target = existing.as_array_mut().expect("coerced to array above");
    target.extend(logs.iter().map(|l| Value::String(l.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_earlier_keys() {
        let mut diag = json!({ "last_step": "generate", "error": "boom" });
        let update = DiagnosticUpdate::new().entry(KEY_REASON, json!("timeout"));
        merge_map(&mut diag, &update.entries);

        assert_eq!(diag["last_step"], "generate");
        assert_eq!(diag["error"], "boom");
        assert_eq!(diag["reason"], "timeout");
    }

    #[test]
    fn merge_overwrites_repeated_key_with_newer_value() {
        let mut diag = json!({ "last_step": "generate" });
        let update = DiagnosticUpdate::new().entry(KEY_LAST_STEP, json!("materialize"));
        merge_map(&mut diag, &update.entries);
        assert_eq!(diag["last_step"], "materialize");
    }

    #[test]
    fn merge_coerces_non_object_state() {
        let mut diag = Value::Null;
        let update = DiagnosticUpdate::new().error("boom");
        merge_map(&mut diag, &update.entries);
        assert_eq!(diag["error"], "boom");
    }

    #[test]
    fn logs_append_in_order() {
        let mut logs = json!(["first"]);
        append_logs(&mut logs, &["second".into(), "third".into()]);
        assert_eq!(logs, json!(["first", "second", "third"]));
    }

    #[test]
    fn stale_timeout_carries_reason_and_detection_time() {
        let update = DiagnosticUpdate::stale_timeout();
        assert_eq!(update.entries[KEY_REASON], "timeout");
        assert!(update.entries.contains_key(KEY_DETECTED_AT));
        assert_eq!(update.logs.len(), 1);
    }
}
