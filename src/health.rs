//! Health check module
//! Reports store reachability and the set of configured providers.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::database::store::WalletStore;
use crate::vending::registry::ProviderRegistry;
use crate::vending::types::ProviderId;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub providers: Vec<ProviderId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn WalletStore>,
    registry: Arc<ProviderRegistry>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn WalletStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut checks = HashMap::new();
        let started = Instant::now();

        let store = match timeout(CHECK_TIMEOUT, self.store.ping()).await {
            Ok(Ok(())) => {
                let elapsed = started.elapsed().as_millis();
                debug!(response_time_ms = elapsed as u64, "store health check ok");
                ComponentHealth::up(Some(elapsed))
            }
            Ok(Err(e)) => {
                error!(error = %e, "store health check failed");
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("store health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };
        let store_up = store.status == ComponentState::Up;
        checks.insert("store".to_string(), store);

        let providers = self.registry.providers();
        let status = if !store_up {
            HealthState::Unhealthy
        } else if providers.is_empty() {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthStatus {
            status,
            checks,
            providers,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;

    #[tokio::test]
    async fn empty_registry_is_degraded() {
        let checker = HealthChecker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ProviderRegistry::new()),
        );
        let health = checker.check_health().await;
        assert_eq!(health.status, HealthState::Degraded);
        assert_eq!(health.checks["store"].status, ComponentState::Up);
        assert!(!health.is_healthy());
    }
}
