//! Explicit model-id → adapter registry.
//!
//! Built once at startup and carried in application state. Nothing in
//! this crate reaches for a global - a handler or worker without a
//! registry reference simply cannot resolve adapters.

use std::collections::HashMap;

use crate::adapter::ProviderAdapter;

/// Maps model ids to their registered adapters.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, ProviderAdapter>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a model id. Re-registering a model id
    /// replaces the previous adapter.
    pub fn register(&mut self, model_id: impl Into<String>, adapter: ProviderAdapter) {
        let model_id = model_id.into();
        tracing::info!(model_id = %model_id, variant = adapter.variant(), "Provider registered");
        self.adapters.insert(model_id, adapter);
    }

    /// Resolve a model id to its adapter.
    pub fn resolve(&self, model_id: &str) -> Option<&ProviderAdapter> {
        self.adapters.get(model_id)
    }

    /// Whether a model id is registered.
    pub fn contains(&self, model_id: &str) -> bool {
        self.adapters.contains_key(model_id)
    }

    /// All registered model ids, sorted for stable output.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::adapter::{GenerationRequest, OutputDescriptor, SyncGeneration};
    use crate::error::ProviderError;

    struct Noop;

    #[async_trait]
    impl SyncGeneration for Noop {
        async fn generate_one(
            &self,
            _request: &GenerationRequest,
            _index: u32,
        ) -> Result<OutputDescriptor, ProviderError> {
            Err(ProviderError::Upstream("noop".into()))
        }
    }

    #[test]
    fn resolve_finds_registered_models_only() {
        let mut registry = ProviderRegistry::new();
        registry.register("sync-image", ProviderAdapter::Sync(Arc::new(Noop)));

        assert!(registry.contains("sync-image"));
        assert!(registry.resolve("sync-image").is_some());
        assert!(registry.resolve("video-pro").is_none());
        assert_eq!(registry.model_ids(), vec!["sync-image"]);
    }
}
