use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use super::{failure_result, read_envelope, rejection, unsupported};
use crate::config::ProviderConfig;
use crate::vending::capabilities::{CapabilityTable, EndpointSpec, Operation, PROVIDER_B};
use crate::vending::http::{UpstreamError, UpstreamReply, VendingHttpClient};
use crate::vending::normalize::{decimal_field, major_to_minor, minor_to_major, text_field};
use crate::vending::provider::ProviderAdapter;
use crate::vending::types::{CatalogPlan, Category, ProviderId, ProviderResult, PurchaseRequest};

const PROVIDER: ProviderId = ProviderId::ProviderB;

// ---------------------------------------------------------------------------
// Wire mapping
// ---------------------------------------------------------------------------

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("{} is required", field)),
    }
}

fn meter_type(request: &PurchaseRequest) -> Result<&'static str, String> {
    request
        .meter_type
        .map(|m| m.as_str())
        .ok_or_else(|| "meter_type is required".to_string())
}

fn minor_amount(request: &PurchaseRequest) -> Result<i64, String> {
    let major = request
        .amount
        .ok_or_else(|| "amount is required".to_string())?;
    major_to_minor(major).ok_or_else(|| format!("amount {} cannot be sent", major))
}

pub fn purchase_body(request: &PurchaseRequest) -> Result<JsonValue, String> {
    let recipient = request.recipient.trim();
    let biller = request.carrier_or_biller.trim();
    let plan = request.plan_or_service_id.as_deref();
    match request.category {
        Category::Data => Ok(json!({
            "plan_id": required(plan, "plan_or_service_id")?,
            "phone_number": recipient,
        })),
        Category::Electricity => Ok(json!({
            "biller": biller,
            "meter_number": recipient,
            "meter_type": meter_type(request)?,
            "amount": minor_amount(request)?,
        })),
        Category::Cable => Ok(json!({
            "biller": biller,
            "smartCardNumber": recipient,
            "plan_id": required(plan, "plan_or_service_id")?,
        })),
        other => Err(format!("{} is not sold by {}", other, PROVIDER)),
    }
}

pub fn validation_body(request: &PurchaseRequest) -> Result<JsonValue, String> {
    let recipient = request.recipient.trim();
    let biller = request.carrier_or_biller.trim();
    match request.category {
        Category::Electricity => Ok(json!({
            "biller": biller,
            "meter_number": recipient,
            "meter_type": meter_type(request)?,
        })),
        Category::Cable => Ok(json!({
            "biller": biller,
            "smartCardNumber": recipient,
        })),
        other => Err(format!("no recipient lookup for {}", other)),
    }
}

fn catalog_filter(category: Category) -> &'static str {
    match category {
        Category::Cable => "biller",
        _ => "network",
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// API-key provider. Amounts and prices are in minor units on the wire.
pub struct ProviderBAdapter {
    http: VendingHttpClient,
    base_url: String,
    api_key: String,
}

impl ProviderBAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: VendingHttpClient::new(config.timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, spec: &EndpointSpec) -> String {
        format!("{}/{}", self.base_url, spec.path)
    }

    async fn send(
        &self,
        spec: &EndpointSpec,
        url: &str,
        body: Option<&JsonValue>,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.http
            .request_json(
                spec.verb.method(),
                url,
                &[("x-api-key", self.api_key.as_str())],
                body,
            )
            .await
    }
}

#[async_trait]
impl ProviderAdapter for ProviderBAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> &'static CapabilityTable {
        &PROVIDER_B
    }

    async fn execute(&self, request: &PurchaseRequest) -> ProviderResult {
        let category = request.category;
        let spec = match PROVIDER_B.endpoint(category, Operation::Purchase) {
            Some(spec) => spec,
            None => return unsupported(PROVIDER, category, "purchases"),
        };
        let body = match purchase_body(request) {
            Ok(body) => body,
            Err(message) => return rejection(PROVIDER, &message),
        };

        debug!(provider = %PROVIDER, category = %category, path = spec.path, "dispatching purchase");
        let reply = match self.send(spec, &self.url(spec), Some(&body)).await {
            Ok(reply) => reply,
            Err(err) => return failure_result(PROVIDER, category, spec.path, err),
        };
        let envelope = match read_envelope(&reply) {
            Ok(envelope) => envelope,
            Err(err) => return failure_result(PROVIDER, category, spec.path, err),
        };
        if !envelope.succeeded {
            info!(provider = %PROVIDER, category = %category, message = %envelope.message, "purchase rejected");
            return rejection(PROVIDER, &envelope.message);
        }

        let reference = match text_field(envelope.data, &["reference", "transaction_ref", "id"]) {
            Some(reference) => reference,
            None => {
                return failure_result(
                    PROVIDER,
                    category,
                    spec.path,
                    UpstreamError::malformed("success response without a reference"),
                )
            }
        };
        let charged = decimal_field(envelope.data, &["price", "amount"])
            .map(minor_to_major)
            .or(request.amount)
            .unwrap_or(Decimal::ZERO);
        let token = text_field(envelope.data, &["token", "meter_token"]);

        info!(
            provider = %PROVIDER,
            category = %category,
            upstream_reference = %reference,
            "purchase fulfilled"
        );
        ProviderResult::fulfilled(PROVIDER, reference, charged, token, envelope.message)
    }

    async fn validate_customer(&self, request: &PurchaseRequest) -> ProviderResult {
        let category = request.category;
        let spec = match PROVIDER_B.endpoint(category, Operation::Validate) {
            Some(spec) => spec,
            None => return unsupported(PROVIDER, category, "recipient lookup"),
        };
        let body = match validation_body(request) {
            Ok(body) => body,
            Err(message) => return rejection(PROVIDER, &message),
        };

        let reply = match self.send(spec, &self.url(spec), Some(&body)).await {
            Ok(reply) => reply,
            Err(err) => return failure_result(PROVIDER, category, spec.path, err),
        };
        let envelope = match read_envelope(&reply) {
            Ok(envelope) => envelope,
            Err(err) => return failure_result(PROVIDER, category, spec.path, err),
        };
        if !envelope.succeeded {
            return rejection(PROVIDER, &envelope.message);
        }

        let customer = text_field(envelope.data, &["customer_name", "name", "customerName"])
            .unwrap_or(envelope.message);
        ProviderResult::fulfilled(PROVIDER, String::new(), Decimal::ZERO, None, customer)
    }

    async fn fetch_catalog(
        &self,
        category: Category,
        carrier: &str,
    ) -> Result<Vec<CatalogPlan>, UpstreamError> {
        let spec = PROVIDER_B
            .endpoint(category, Operation::Catalog)
            .ok_or_else(|| {
                UpstreamError::malformed(format!("{} has no catalog for {}", PROVIDER, category))
            })?;
        let url = Url::parse_with_params(
            &self.url(spec),
            &[(catalog_filter(category), carrier.trim())],
        )
        .map_err(|e| UpstreamError::malformed(format!("invalid catalog url: {}", e)))?;

        let reply = self.send(spec, url.as_str(), None).await?;
        let envelope = read_envelope(&reply)?;
        if !envelope.succeeded {
            return Err(UpstreamError::malformed(format!(
                "catalog request refused: {}",
                envelope.message
            )));
        }

        let items = envelope
            .data
            .as_array()
            .ok_or_else(|| UpstreamError::malformed("catalog data is not a list"))?;
        let mut plans = Vec::with_capacity(items.len());
        for item in items {
            let plan_id = text_field(item, &["plan_id", "id", "code"]);
            let price = decimal_field(item, &["price", "amount"]);
            match (plan_id, price) {
                (Some(plan_id), Some(price)) => plans.push(CatalogPlan {
                    name: text_field(item, &["name", "description"])
                        .unwrap_or_else(|| plan_id.clone()),
                    plan_id,
                    price: minor_to_major(price),
                }),
                _ => warn!(provider = %PROVIDER, category = %category, "skipping unreadable catalog entry"),
            }
        }
        Ok(plans)
    }
}
