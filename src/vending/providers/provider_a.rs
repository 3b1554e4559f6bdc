use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use super::{failure_result, read_envelope, rejection, unsupported};
use crate::config::ProviderConfig;
use crate::vending::capabilities::{CapabilityTable, EndpointSpec, Operation, PROVIDER_A};
use crate::vending::http::{UpstreamError, VendingHttpClient};
use crate::vending::normalize::{decimal_field, decimal_json, text_field};
use crate::vending::provider::ProviderAdapter;
use crate::vending::types::{
    CatalogPlan, Category, MeterType, ProviderId, ProviderResult, PurchaseRequest,
};

const PROVIDER: ProviderId = ProviderId::ProviderA;

// ---------------------------------------------------------------------------
// Wire mapping
// ---------------------------------------------------------------------------

fn meter_type_code(meter_type: MeterType) -> u8 {
    match meter_type {
        MeterType::Prepaid => 1,
        MeterType::Postpaid => 2,
    }
}

fn code(spec: &EndpointSpec, raw: &str) -> String {
    let trimmed = raw.trim();
    if spec.lowercase_code {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("{} is required", field)),
    }
}

fn amount(request: &PurchaseRequest) -> Result<Decimal, String> {
    request.amount.ok_or_else(|| "amount is required".to_string())
}

fn meter_type(request: &PurchaseRequest) -> Result<MeterType, String> {
    request
        .meter_type
        .ok_or_else(|| "meter_type is required".to_string())
}

/// Request body for a purchase. Every category in the capability table maps.
pub fn purchase_body(spec: &EndpointSpec, request: &PurchaseRequest) -> Result<JsonValue, String> {
    let recipient = request.recipient.trim();
    let plan = request.plan_or_service_id.as_deref();
    let body = match request.category {
        Category::Airtime => json!({
            "serviceID": code(spec, &request.carrier_or_biller),
            "mobileNumber": recipient,
            "amount": decimal_json(amount(request)?),
        }),
        Category::Data => json!({
            "serviceID": required(plan, "plan_or_service_id")?,
            "mobileNumber": recipient,
        }),
        Category::Electricity => json!({
            "serviceID": code(spec, &request.carrier_or_biller),
            "meterNum": recipient,
            "meterType": meter_type_code(meter_type(request)?),
            "amount": decimal_json(amount(request)?),
        }),
        Category::Cable => json!({
            "serviceID": required(plan, "plan_or_service_id")?,
            "iucNum": recipient,
        }),
        Category::Education => json!({
            "serviceID": required(plan, "plan_or_service_id")?,
            "quantity": request.quantity(),
        }),
    };
    Ok(body)
}

/// Request body for a meter or smartcard lookup.
pub fn validation_body(
    spec: &EndpointSpec,
    request: &PurchaseRequest,
) -> Result<JsonValue, String> {
    let recipient = request.recipient.trim();
    match request.category {
        Category::Electricity => Ok(json!({
            "serviceID": code(spec, &request.carrier_or_biller),
            "meterNum": recipient,
            "meterType": meter_type_code(meter_type(request)?),
        })),
        Category::Cable => Ok(json!({
            "serviceID": code(spec, &request.carrier_or_biller),
            "iucNum": recipient,
        })),
        other => Err(format!("no recipient lookup for {}", other)),
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Token-authenticated provider. Amounts travel in major units.
pub struct ProviderAAdapter {
    http: VendingHttpClient,
    base_url: String,
    api_key: String,
}

impl ProviderAAdapter {
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

    fn auth_headers(&self, spec: &EndpointSpec) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Authorization", format!("Token {}", self.api_key))];
        if spec.duplicate_auth_header {
            headers.push(("Authorization-Token", self.api_key.clone()));
        }
        headers
    }

    async fn post(
        &self,
        spec: &EndpointSpec,
        body: &JsonValue,
    ) -> Result<crate::vending::http::UpstreamReply, UpstreamError> {
        let headers = self.auth_headers(spec);
        let header_refs: Vec<(&str, &str)> =
            headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.http
            .request_json(spec.verb.method(), &self.url(spec), &header_refs, Some(body))
            .await
    }
}

#[async_trait]
impl ProviderAdapter for ProviderAAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> &'static CapabilityTable {
        &PROVIDER_A
    }

    async fn execute(&self, request: &PurchaseRequest) -> ProviderResult {
        let category = request.category;
        let spec = match PROVIDER_A.endpoint(category, Operation::Purchase) {
            Some(spec) => spec,
            None => return unsupported(PROVIDER, category, "purchases"),
        };
        let body = match purchase_body(spec, request) {
            Ok(body) => body,
            Err(message) => return rejection(PROVIDER, &message),
        };

        debug!(provider = %PROVIDER, category = %category, path = spec.path, "dispatching purchase");
        let reply = match self.post(spec, &body).await {
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

        let reference = match text_field(
            envelope.data,
            &["reference", "ref", "requestId", "transactionId"],
        ) {
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
        let charged = decimal_field(envelope.data, &["amount", "amount_charged", "price"])
            .or(request.amount)
            .unwrap_or(Decimal::ZERO);
        let token = text_field(envelope.data, &["token", "Token", "pin", "pins"]);

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
        let spec = match PROVIDER_A.endpoint(category, Operation::Validate) {
            Some(spec) => spec,
            None => return unsupported(PROVIDER, category, "recipient lookup"),
        };
        let body = match validation_body(spec, request) {
            Ok(body) => body,
            Err(message) => return rejection(PROVIDER, &message),
        };

        let reply = match self.post(spec, &body).await {
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

        let customer = text_field(
            envelope.data,
            &["customerName", "customer_name", "Customer_Name", "name"],
        )
        .unwrap_or(envelope.message);
        ProviderResult::fulfilled(PROVIDER, String::new(), Decimal::ZERO, None, customer)
    }

    async fn fetch_catalog(
        &self,
        category: Category,
        carrier: &str,
    ) -> Result<Vec<CatalogPlan>, UpstreamError> {
        let spec = PROVIDER_A
            .endpoint(category, Operation::Catalog)
            .ok_or_else(|| {
                UpstreamError::malformed(format!("{} has no catalog for {}", PROVIDER, category))
            })?;
        let url = Url::parse_with_params(
            &self.url(spec),
            &[("category", category.as_str()), ("carrier", carrier.trim())],
        )
        .map_err(|e| UpstreamError::malformed(format!("invalid catalog url: {}", e)))?;

        let headers = self.auth_headers(spec);
        let header_refs: Vec<(&str, &str)> =
            headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let reply = self
            .http
            .request_json(spec.verb.method(), url.as_str(), &header_refs, None)
            .await?;
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
            let plan_id = text_field(item, &["serviceID", "service_id", "code"]);
            let price = decimal_field(item, &["amount", "price"]);
            match (plan_id, price) {
                (Some(plan_id), Some(price)) => plans.push(CatalogPlan {
                    name: text_field(item, &["name", "description"])
                        .unwrap_or_else(|| plan_id.clone()),
                    plan_id,
                    price,
                }),
                _ => warn!(provider = %PROVIDER, category = %category, "skipping unreadable catalog entry"),
            }
        }
        Ok(plans)
    }
}
