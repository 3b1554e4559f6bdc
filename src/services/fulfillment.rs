//! One purchase, end to end: route, price, check balance, call the provider,
//! then either settle (debit + SUCCESS in one store operation) or append a
//! FAILED record without touching the wallet.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::database::error::StoreError;
use crate::database::models::{NewTransaction, Transaction};
use crate::database::store::{TransactionLedger, WalletStore};
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::services::catalog::CatalogService;
use crate::services::pricing::{PricingEngine, UserTier};
use crate::system_config::SystemConfig;
use crate::vending::http::{UpstreamError, UpstreamErrorKind};
use crate::vending::provider::ProviderAdapter;
use crate::vending::router::Router;
use crate::vending::types::{
    CatalogPlan, Category, ProviderId, ProviderResult, PurchaseRequest, UpstreamFailure,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub provider: ProviderId,
    /// Provider cost in major units.
    pub base_cost: Decimal,
    /// What the user pays.
    pub charge: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerLookup {
    pub provider: ProviderId,
    pub customer_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedPlan {
    pub plan_id: String,
    pub name: String,
    pub base_cost: Decimal,
    pub price: Decimal,
}

/// Serializes live purchases per user within this process.
#[derive(Clone, Default)]
struct UserLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry once nobody else holds or waits on it.
    async fn release(&self, user_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.inner.lock().await;
        if let Some(lock) = locks.get(user_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(user_id);
            }
        }
    }
}

#[derive(Clone)]
pub struct FulfillmentService {
    router: Router,
    pricing: PricingEngine,
    catalog: CatalogService,
    wallets: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    locks: UserLocks,
}

impl FulfillmentService {
    pub fn new(
        router: Router,
        catalog: CatalogService,
        wallets: Arc<dyn WalletStore>,
        ledger: Arc<dyn TransactionLedger>,
    ) -> Self {
        Self {
            router,
            pricing: PricingEngine::new(),
            catalog,
            wallets,
            ledger,
            locks: UserLocks::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Pricing
    // -----------------------------------------------------------------------

    /// Routing, base-cost discovery and pricing, without side effects.
    pub async fn quote(
        &self,
        request: &PurchaseRequest,
        user_id: &str,
        config: &SystemConfig,
    ) -> FulfillmentResult<Quote> {
        request.validate()?;
        let account = self.wallets.account(user_id).await?;
        let adapter = self.router.route(request.category, config)?;
        self.quote_for(adapter.as_ref(), request, account.tier, config)
            .await
    }

    async fn quote_for(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &PurchaseRequest,
        tier: UserTier,
        config: &SystemConfig,
    ) -> FulfillmentResult<Quote> {
        let base_cost = self.base_cost(adapter, request).await?;
        let charge = self.pricing.compute_charge(
            base_cost,
            request.category,
            adapter.id(),
            tier,
            &config.margins,
        )?;
        Ok(Quote {
            provider: adapter.id(),
            base_cost,
            charge,
        })
    }

    async fn base_cost(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &PurchaseRequest,
    ) -> FulfillmentResult<Decimal> {
        if request.category.is_upfront_priced() {
            return request.amount.ok_or_else(|| FulfillmentError::InvalidRequest {
                message: "amount is required for this category".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let plan_id = request.plan_or_service_id.as_deref().unwrap_or("").trim();
        let plan = self
            .catalog
            .find_plan(
                adapter,
                request.category,
                &request.carrier_or_biller,
                plan_id,
            )
            .await
            .map_err(|err| upstream_error(adapter.id(), err))?
            .ok_or_else(|| FulfillmentError::InvalidRequest {
                message: format!(
                    "unknown plan {} for {}",
                    plan_id, request.carrier_or_biller
                ),
                field: Some("plan_or_service_id".to_string()),
            })?;

        if request.category == Category::Education {
            Ok(plan.price * Decimal::from(request.quantity()))
        } else {
            Ok(plan.price)
        }
    }

    /// Catalog listing with each plan priced for the caller's tier.
    pub async fn priced_catalog(
        &self,
        category: Category,
        carrier: &str,
        user_id: &str,
        config: &SystemConfig,
    ) -> FulfillmentResult<Vec<PricedPlan>> {
        if category.is_upfront_priced() {
            return Err(FulfillmentError::InvalidRequest {
                message: format!("{} has no plan catalog", category),
                field: Some("category".to_string()),
            });
        }
        let account = self.wallets.account(user_id).await?;
        let adapter = self.router.route(category, config)?;
        let plans: Vec<CatalogPlan> = self
            .catalog
            .plans(adapter.as_ref(), category, carrier)
            .await
            .map_err(|err| upstream_error(adapter.id(), err))?;

        plans
            .into_iter()
            .map(|plan| -> FulfillmentResult<PricedPlan> {
                let price = self.pricing.compute_charge(
                    plan.price,
                    category,
                    adapter.id(),
                    account.tier,
                    &config.margins,
                )?;
                Ok(PricedPlan {
                    plan_id: plan.plan_id,
                    name: plan.name,
                    base_cost: plan.price,
                    price,
                })
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Purchases
    // -----------------------------------------------------------------------

    /// Live purchase. The charge is quoted before anything is dispatched.
    pub async fn purchase(
        &self,
        request: &PurchaseRequest,
        user_id: &str,
        config: &SystemConfig,
    ) -> FulfillmentResult<Transaction> {
        request.validate()?;
        let account = self.wallets.account(user_id).await?;
        let adapter = self.router.route(request.category, config)?;
        let quote = self
            .quote_for(adapter.as_ref(), request, account.tier, config)
            .await?;

        self.fulfil(
            adapter,
            request,
            user_id,
            quote.charge,
            Some(quote.base_cost),
        )
        .await
    }

    /// Purchase at a charge fixed earlier, as the scheduler does.
    pub async fn purchase_at_charge(
        &self,
        request: &PurchaseRequest,
        user_id: &str,
        charge: Decimal,
        config: &SystemConfig,
    ) -> FulfillmentResult<Transaction> {
        request.validate()?;
        if charge <= Decimal::ZERO {
            return Err(FulfillmentError::InvalidRequest {
                message: "charge must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        let adapter = self.router.route(request.category, config)?;
        self.fulfil(adapter, request, user_id, charge, None).await
    }

    /// Runs the balance check, dispatch and settlement on its own task so a
    /// caller that goes away mid-call cannot leave a dispatched purchase
    /// without its ledger entry.
    async fn fulfil(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        request: &PurchaseRequest,
        user_id: &str,
        charge: Decimal,
        expected_cost: Option<Decimal>,
    ) -> FulfillmentResult<Transaction> {
        let service = self.clone();
        let request = request.clone();
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            let guard = service.locks.acquire(&user_id).await;
            let outcome = service
                .fulfil_locked(adapter.as_ref(), &request, &user_id, charge, expected_cost)
                .await;
            service.locks.release(&user_id, guard).await;
            outcome
        });

        task.await.map_err(|err| {
            error!(error = %err, "purchase task did not complete");
            FulfillmentError::Internal {
                message: format!("purchase task failed: {}", err),
            }
        })?
    }

    async fn fulfil_locked(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &PurchaseRequest,
        user_id: &str,
        charge: Decimal,
        expected_cost: Option<Decimal>,
    ) -> FulfillmentResult<Transaction> {
        let category = request.category;
        let provider = adapter.id();

        let account = self.wallets.account(user_id).await?;
        if account.balance < charge {
            info!(
                user_id = user_id,
                category = %category,
                balance = %account.balance,
                charge = %charge,
                "insufficient balance, purchase not dispatched"
            );
            return Err(FulfillmentError::InsufficientBalance {
                available: account.balance,
                required: charge,
            });
        }

        let result = adapter.execute(request).await;

        if !result.success {
            let tx = self
                .ledger
                .record_failure(NewTransaction {
                    user_id: user_id.to_string(),
                    category,
                    amount: charge,
                    provider_id: provider,
                    upstream_reference: result.upstream_reference.clone(),
                    message: result.message.clone(),
                    token: None,
                })
                .await?;
            warn!(
                user_id = user_id,
                category = %category,
                provider = %provider,
                transaction_id = %tx.id,
                transient = result.is_transient,
                "purchase failed"
            );
            return Err(failure_error(&result, Some(tx.id)));
        }

        if let Some(expected) = expected_cost {
            if category.requires_plan()
                && result.raw_amount_charged > Decimal::ZERO
                && result.raw_amount_charged != expected
            {
                warn!(
                    user_id = user_id,
                    category = %category,
                    provider = %provider,
                    quoted = %expected,
                    reported = %result.raw_amount_charged,
                    "provider cost drifted from catalog price"
                );
            }
        }

        let settled = self
            .ledger
            .settle_success(NewTransaction {
                user_id: user_id.to_string(),
                category,
                amount: charge,
                provider_id: provider,
                upstream_reference: result.upstream_reference.clone(),
                message: result.message.clone(),
                token: result.token.clone(),
            })
            .await;

        match settled {
            Ok((tx, balance)) => {
                info!(
                    user_id = user_id,
                    category = %category,
                    provider = %provider,
                    upstream_reference = %tx.upstream_reference,
                    charge = %charge,
                    balance = %balance,
                    "purchase settled"
                );
                Ok(tx)
            }
            Err(StoreError::InsufficientFunds { balance, .. }) => {
                error!(
                    user_id = user_id,
                    category = %category,
                    provider = %provider,
                    upstream_reference = %result.upstream_reference,
                    charge = %charge,
                    balance = %balance,
                    "settlement conflict: provider fulfilled but wallet debit lost a race"
                );
                let tx = self
                    .ledger
                    .record_failure(NewTransaction {
                        user_id: user_id.to_string(),
                        category,
                        amount: charge,
                        provider_id: provider,
                        upstream_reference: result.upstream_reference.clone(),
                        message: format!(
                            "settlement conflict: fulfilled upstream, debit of {} refused",
                            charge
                        ),
                        token: result.token.clone(),
                    })
                    .await?;
                Err(FulfillmentError::SettlementConflict {
                    category,
                    provider,
                    upstream_reference: result.upstream_reference,
                    transaction_id: Some(tx.id),
                })
            }
            Err(err) => {
                error!(
                    user_id = user_id,
                    category = %category,
                    provider = %provider,
                    upstream_reference = %result.upstream_reference,
                    error = %err,
                    "failed to settle fulfilled purchase"
                );
                Err(err.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recipient lookups
    // -----------------------------------------------------------------------

    /// Meter or smartcard lookup. Never writes to the ledger.
    pub async fn validate_recipient(
        &self,
        request: &PurchaseRequest,
        config: &SystemConfig,
    ) -> FulfillmentResult<CustomerLookup> {
        if !matches!(request.category, Category::Electricity | Category::Cable) {
            return Err(FulfillmentError::InvalidRequest {
                message: format!("{} has no recipient lookup", request.category),
                field: Some("category".to_string()),
            });
        }
        if request.recipient.trim().is_empty() || request.carrier_or_biller.trim().is_empty() {
            return Err(FulfillmentError::InvalidRequest {
                message: "carrier_or_biller and recipient are required".to_string(),
                field: Some("recipient".to_string()),
            });
        }
        if request.category == Category::Electricity && request.meter_type.is_none() {
            return Err(FulfillmentError::InvalidRequest {
                message: "meter_type is required for electricity".to_string(),
                field: Some("meter_type".to_string()),
            });
        }

        let adapter = self.router.route(request.category, config)?;
        let result = adapter.validate_customer(request).await;
        if !result.success {
            return Err(failure_error(&result, None));
        }
        Ok(CustomerLookup {
            provider: result.provider,
            customer_name: result.message,
        })
    }
}

fn failure_error(
    result: &ProviderResult,
    transaction_id: Option<uuid::Uuid>,
) -> FulfillmentError {
    let provider = result.provider;
    let message = result.message.clone();
    match result.failure {
        Some(UpstreamFailure::Rejected) => FulfillmentError::UpstreamRejected {
            provider,
            message,
            transaction_id,
        },
        Some(UpstreamFailure::Malformed) => FulfillmentError::MalformedUpstreamResponse {
            provider,
            message,
            transaction_id,
        },
        Some(_) => FulfillmentError::UpstreamTransient {
            provider,
            message,
            transaction_id,
        },
        None if result.is_transient => FulfillmentError::UpstreamTransient {
            provider,
            message,
            transaction_id,
        },
        None => FulfillmentError::UpstreamRejected {
            provider,
            message,
            transaction_id,
        },
    }
}

fn upstream_error(provider: ProviderId, err: UpstreamError) -> FulfillmentError {
    match err.kind {
        UpstreamErrorKind::Malformed => FulfillmentError::MalformedUpstreamResponse {
            provider,
            message: err.message,
            transaction_id: None,
        },
        _ => FulfillmentError::UpstreamTransient {
            provider,
            message: err.message,
            transaction_id: None,
        },
    }
}
