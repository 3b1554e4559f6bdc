use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::vending::http::UpstreamError;
use crate::vending::provider::ProviderAdapter;
use crate::vending::providers::{ProviderAAdapter, ProviderBAdapter};
use crate::vending::types::ProviderId;

/// Adapter instances keyed by provider, built once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        provider_a: &ProviderConfig,
        provider_b: &ProviderConfig,
    ) -> Result<Self, UpstreamError> {
        let mut registry = Self::new();
        registry.register(Arc::new(ProviderAAdapter::new(provider_a)?));
        registry.register(Arc::new(ProviderBAdapter::new(provider_b)?));
        Ok(registry)
    }

    /// Replaces any adapter already registered under the same id.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }
}
