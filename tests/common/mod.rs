//! Shared fixtures for integration tests: a scripted adapter, default
//! settings and request builders.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vendora_backend::database::InMemoryStore;
use vendora_backend::services::catalog::CatalogService;
use vendora_backend::services::fulfillment::FulfillmentService;
use vendora_backend::services::pricing::UserTier;
use vendora_backend::system_config::SystemConfig;
use vendora_backend::vending::capabilities::{table_for, CapabilityTable};
use vendora_backend::vending::http::UpstreamError;
use vendora_backend::vending::{
    CatalogPlan, Category, MeterType, ProviderAdapter, ProviderId, ProviderRegistry,
    ProviderResult, PurchaseRequest, Router,
};

pub const SETTINGS: &str = r#"
[margins.additive]
user = 50
reseller = 30
api_merchant = 20
admin = 0

[margins.percentage]
user = 2
reseller = 1
api_merchant = 1
admin = 0
"#;

pub fn settings() -> SystemConfig {
    SystemConfig::from_toml_str(SETTINGS).expect("test settings parse")
}

/// Adapter that replays queued results and counts every upstream call.
pub struct ScriptedProvider {
    id: ProviderId,
    outcomes: Mutex<VecDeque<ProviderResult>>,
    plans: Vec<CatalogPlan>,
    delay: Option<Duration>,
    executions: AtomicUsize,
    lookups: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            outcomes: Mutex::new(VecDeque::new()),
            plans: Vec::new(),
            delay: None,
            executions: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_plan(mut self, plan_id: &str, price: Decimal) -> Self {
        self.plans.push(CatalogPlan {
            plan_id: plan_id.to_string(),
            name: plan_id.to_uppercase(),
            price,
        });
        self
    }

    /// Holds every purchase this long after it has been received.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcome: ProviderResult) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> &'static CapabilityTable {
        table_for(self.id)
    }

    async fn execute(&self, request: &PurchaseRequest) -> ProviderResult {
        let n = self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
            ProviderResult::fulfilled(
                self.id,
                format!("{}-ref-{}", self.id, n),
                request.amount.unwrap_or(Decimal::ZERO),
                None,
                "Transaction successful",
            )
        })
    }

    async fn validate_customer(&self, _request: &PurchaseRequest) -> ProviderResult {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        ProviderResult::fulfilled(self.id, "", Decimal::ZERO, None, "ADA OKAFOR")
    }

    async fn fetch_catalog(
        &self,
        _category: Category,
        _carrier: &str,
    ) -> Result<Vec<CatalogPlan>, UpstreamError> {
        Ok(self.plans.clone())
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub provider_a: Arc<ScriptedProvider>,
    pub provider_b: Arc<ScriptedProvider>,
    pub fulfillment: FulfillmentService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_providers(
            ScriptedProvider::new(ProviderId::ProviderA)
                .with_plan("waec", dec!(3500))
                .with_plan("dstv-compact", dec!(15700)),
            ScriptedProvider::new(ProviderId::ProviderB).with_plan("mtn-1gb", dec!(450)),
        )
    }

    pub fn with_providers(a: ScriptedProvider, b: ScriptedProvider) -> Self {
        let store = InMemoryStore::new();
        let provider_a = Arc::new(a);
        let provider_b = Arc::new(b);
        let registry = ProviderRegistry::new()
            .with(provider_a.clone())
            .with(provider_b.clone());
        let fulfillment = FulfillmentService::new(
            Router::new(Arc::new(registry)),
            CatalogService::new(Duration::from_secs(300)),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        Self {
            store,
            provider_a,
            provider_b,
            fulfillment,
        }
    }

    pub async fn fund(&self, user_id: &str, balance: Decimal) {
        self.store.upsert_wallet(user_id, UserTier::User, balance).await;
    }
}

pub fn airtime(amount: Decimal) -> PurchaseRequest {
    PurchaseRequest {
        category: Category::Airtime,
        carrier_or_biller: "MTN".to_string(),
        recipient: "08031234567".to_string(),
        plan_or_service_id: None,
        amount: Some(amount),
        meter_type: None,
        quantity: None,
    }
}

pub fn data(plan_id: &str) -> PurchaseRequest {
    PurchaseRequest {
        category: Category::Data,
        carrier_or_biller: "MTN".to_string(),
        recipient: "08031234567".to_string(),
        plan_or_service_id: Some(plan_id.to_string()),
        amount: None,
        meter_type: None,
        quantity: None,
    }
}

pub fn electricity(amount: Decimal) -> PurchaseRequest {
    PurchaseRequest {
        category: Category::Electricity,
        carrier_or_biller: "ikeja-electric".to_string(),
        recipient: "45012345678".to_string(),
        plan_or_service_id: None,
        amount: Some(amount),
        meter_type: Some(MeterType::Prepaid),
        quantity: None,
    }
}

pub fn cable(plan_id: &str) -> PurchaseRequest {
    PurchaseRequest {
        category: Category::Cable,
        carrier_or_biller: "dstv".to_string(),
        recipient: "7023456789".to_string(),
        plan_or_service_id: Some(plan_id.to_string()),
        amount: None,
        meter_type: None,
        quantity: None,
    }
}

pub fn education(plan_id: &str, quantity: u32) -> PurchaseRequest {
    PurchaseRequest {
        category: Category::Education,
        carrier_or_biller: "waec".to_string(),
        recipient: "08031234567".to_string(),
        plan_or_service_id: Some(plan_id.to_string()),
        amount: None,
        meter_type: None,
        quantity: Some(quantity),
    }
}
