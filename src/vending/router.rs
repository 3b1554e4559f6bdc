use std::sync::Arc;
use thiserror::Error;

use crate::system_config::SystemConfig;
use crate::vending::provider::ProviderAdapter;
use crate::vending::registry::ProviderRegistry;
use crate::vending::types::{Category, ProviderId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("provider {provider} does not support {category}")]
    Unsupported {
        category: Category,
        provider: ProviderId,
    },

    #[error("provider {provider} is routed for {category} but not configured")]
    NotConfigured {
        category: Category,
        provider: ProviderId,
    },
}

/// Used when the settings document names no provider for a category.
pub fn default_provider(category: Category) -> ProviderId {
    match category {
        Category::Airtime => ProviderId::ProviderA,
        Category::Data => ProviderId::ProviderB,
        Category::Electricity => ProviderId::ProviderA,
        Category::Cable => ProviderId::ProviderA,
        Category::Education => ProviderId::ProviderA,
    }
}

/// Table lookup only: configured provider, else the default.
#[derive(Clone)]
pub struct Router {
    registry: Arc<ProviderRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn route(
        &self,
        category: Category,
        config: &SystemConfig,
    ) -> Result<Arc<dyn ProviderAdapter>, RoutingError> {
        let provider = config
            .routing
            .get(category)
            .unwrap_or_else(|| default_provider(category));
        let adapter = self
            .registry
            .get(provider)
            .ok_or(RoutingError::NotConfigured { category, provider })?;
        if !adapter.supports(category) {
            return Err(RoutingError::Unsupported { category, provider });
        }
        Ok(adapter)
    }
}
