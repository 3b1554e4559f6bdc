use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::vending::http::UpstreamError;
use crate::vending::provider::ProviderAdapter;
use crate::vending::types::{CatalogPlan, Category, ProviderId};

type CacheKey = (ProviderId, Category, String);

/// Plan listings cached per (provider, category, carrier).
#[derive(Clone)]
pub struct CatalogService {
    ttl: Duration,
    cache: Arc<RwLock<HashMap<CacheKey, (Vec<CatalogPlan>, DateTime<Utc>)>>>,
}

impl CatalogService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn plans(
        &self,
        adapter: &dyn ProviderAdapter,
        category: Category,
        carrier: &str,
    ) -> Result<Vec<CatalogPlan>, UpstreamError> {
        let key: CacheKey = (adapter.id(), category, carrier.trim().to_lowercase());
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or_else(|_| ChronoDuration::zero());

        {
            let cache = self.cache.read().await;
            if let Some((plans, fetched_at)) = cache.get(&key) {
                if Utc::now() - *fetched_at < ttl {
                    debug!(provider = %key.0, category = %category, "catalog cache hit");
                    return Ok(plans.clone());
                }
            }
        }

        let plans = adapter.fetch_catalog(category, carrier).await?;
        info!(
            provider = %key.0,
            category = %category,
            carrier = %key.2,
            plans = plans.len(),
            "catalog refreshed"
        );
        self.cache
            .write()
            .await
            .insert(key, (plans.clone(), Utc::now()));
        Ok(plans)
    }

    pub async fn find_plan(
        &self,
        adapter: &dyn ProviderAdapter,
        category: Category,
        carrier: &str,
        plan_id: &str,
    ) -> Result<Option<CatalogPlan>, UpstreamError> {
        let plans = self.plans(adapter, category, carrier).await?;
        Ok(plans
            .into_iter()
            .find(|p| p.plan_id.eq_ignore_ascii_case(plan_id.trim())))
    }

    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
        info!("catalog cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vending::capabilities::{CapabilityTable, PROVIDER_B};
    use crate::vending::types::{ProviderResult, PurchaseRequest};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for CountingProvider {
        fn id(&self) -> ProviderId {
            ProviderId::ProviderB
        }

        fn capabilities(&self) -> &'static CapabilityTable {
            &PROVIDER_B
        }

        async fn execute(&self, _request: &PurchaseRequest) -> ProviderResult {
            ProviderResult::rejected(self.id(), "not used")
        }

        async fn validate_customer(&self, _request: &PurchaseRequest) -> ProviderResult {
            ProviderResult::rejected(self.id(), "not used")
        }

        async fn fetch_catalog(
            &self,
            _category: Category,
            _carrier: &str,
        ) -> Result<Vec<CatalogPlan>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![CatalogPlan {
                plan_id: "PLN-1GB".to_string(),
                name: "1GB 30 days".to_string(),
                price: dec!(10),
            }])
        }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let catalog = CatalogService::new(Duration::from_secs(300));

        let plan = catalog
            .find_plan(&provider, Category::Data, "MTN", "pln-1gb")
            .await
            .unwrap();
        assert_eq!(plan.map(|p| p.price), Some(dec!(10)));
        catalog
            .plans(&provider, Category::Data, "mtn")
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        catalog.invalidate().await;
        catalog
            .plans(&provider, Category::Data, "mtn")
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let catalog = CatalogService::new(Duration::ZERO);
        catalog.plans(&provider, Category::Data, "mtn").await.unwrap();
        catalog.plans(&provider, Category::Data, "mtn").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
