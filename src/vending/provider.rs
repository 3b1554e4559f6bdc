use async_trait::async_trait;

use crate::vending::capabilities::CapabilityTable;
use crate::vending::http::UpstreamError;
use crate::vending::types::{CatalogPlan, Category, ProviderId, ProviderResult, PurchaseRequest};

/// One upstream vending API. Implementations hold their own credentials and
/// never touch pricing, wallets or the ledger.
///
/// `execute` and `validate_customer` never fail: every transport, parse or
/// business failure is folded into the returned [`ProviderResult`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> &'static CapabilityTable;

    fn supports(&self, category: Category) -> bool {
        self.capabilities().supports(category)
    }

    async fn execute(&self, request: &PurchaseRequest) -> ProviderResult;

    /// Meter or smartcard lookup. The customer name comes back in `message`.
    async fn validate_customer(&self, request: &PurchaseRequest) -> ProviderResult;

    /// Plans for a catalog-priced category. Prices are in major units.
    async fn fetch_catalog(
        &self,
        category: Category,
        carrier: &str,
    ) -> Result<Vec<CatalogPlan>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vending::capabilities::PROVIDER_B;
    use rust_decimal_macros::dec;

    struct MockProvider;

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        fn id(&self) -> ProviderId {
            ProviderId::ProviderB
        }

        fn capabilities(&self) -> &'static CapabilityTable {
            &PROVIDER_B
        }

        async fn execute(&self, request: &PurchaseRequest) -> ProviderResult {
            ProviderResult::fulfilled(
                self.id(),
                "mock_ref",
                request.amount.unwrap_or(dec!(10)),
                None,
                "ok",
            )
        }

        async fn validate_customer(&self, _request: &PurchaseRequest) -> ProviderResult {
            ProviderResult::fulfilled(self.id(), "", dec!(0), None, "JANE DOE")
        }

        async fn fetch_catalog(
            &self,
            _category: Category,
            _carrier: &str,
        ) -> Result<Vec<CatalogPlan>, UpstreamError> {
            Ok(vec![CatalogPlan {
                plan_id: "mtn-1gb".to_string(),
                name: "1GB".to_string(),
                price: dec!(10),
            }])
        }
    }

    #[tokio::test]
    async fn default_supports_reads_capability_table() {
        let provider: Box<dyn ProviderAdapter> = Box::new(MockProvider);
        assert!(provider.supports(Category::Data));
        assert!(!provider.supports(Category::Airtime));

        let request = PurchaseRequest {
            category: Category::Data,
            carrier_or_biller: "mtn".to_string(),
            recipient: "08031234567".to_string(),
            plan_or_service_id: Some("mtn-1gb".to_string()),
            amount: None,
            meter_type: None,
            quantity: None,
        };
        let result = provider.execute(&request).await;
        assert!(result.success);
        assert_eq!(result.upstream_reference, "mock_ref");
    }
}
