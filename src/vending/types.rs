use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::FulfillmentError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Airtime,
    Data,
    Electricity,
    Cable,
    Education,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Airtime,
        Category::Data,
        Category::Electricity,
        Category::Cable,
        Category::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Airtime => "airtime",
            Category::Data => "data",
            Category::Electricity => "electricity",
            Category::Cable => "cable",
            Category::Education => "education",
        }
    }

    /// Variable-amount categories are priced from the requested amount before
    /// dispatch; the rest are priced per plan from the provider catalog.
    pub fn is_upfront_priced(&self) -> bool {
        matches!(self, Category::Airtime | Category::Electricity)
    }

    pub fn requires_plan(&self) -> bool {
        !self.is_upfront_priced()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "airtime" => Ok(Category::Airtime),
            "data" => Ok(Category::Data),
            "electricity" => Ok(Category::Electricity),
            "cable" | "cable_tv" => Ok(Category::Cable),
            "education" | "exam" => Ok(Category::Education),
            _ => Err(FulfillmentError::InvalidRequest {
                message: format!("unsupported category: {}", value),
                field: Some("category".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeterType {
    Prepaid,
    Postpaid,
}

impl MeterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeterType::Prepaid => "prepaid",
            MeterType::Postpaid => "postpaid",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    ProviderA,
    ProviderB,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::ProviderA => "provider_a",
            ProviderId::ProviderB => "provider_b",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = FulfillmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "provider_a" | "a" => Ok(ProviderId::ProviderA),
            "provider_b" | "b" => Ok(ProviderId::ProviderB),
            _ => Err(FulfillmentError::InvalidRequest {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Provider-agnostic purchase request. Built once per attempt and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRequest {
    pub category: Category,
    pub carrier_or_biller: String,
    pub recipient: String,
    #[serde(default)]
    pub plan_or_service_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub meter_type: Option<MeterType>,
    /// Number of exam PINs; only meaningful for education purchases.
    #[serde(default)]
    pub quantity: Option<u32>,
}

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^(\+?234|0)[789][01]\d{8}$").expect("static regex"))
}

fn numeric_id_pattern() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| Regex::new(r"^\d{6,20}$").expect("static regex"))
}

impl PurchaseRequest {
    pub fn quantity(&self) -> u32 {
        self.quantity.unwrap_or(1).max(1)
    }

    /// Checks the fields each category needs before anything is routed or priced.
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        if self.carrier_or_biller.trim().is_empty() {
            return Err(invalid("carrier_or_biller is required", "carrier_or_biller"));
        }
        let recipient = self.recipient.trim();
        if recipient.is_empty() {
            return Err(invalid("recipient is required", "recipient"));
        }

        match self.category {
            Category::Airtime | Category::Data => {
                if !phone_pattern().is_match(recipient) {
                    return Err(invalid("recipient must be a valid phone number", "recipient"));
                }
            }
            Category::Electricity | Category::Cable => {
                if !numeric_id_pattern().is_match(recipient) {
                    return Err(invalid(
                        "recipient must be a numeric meter or smartcard number",
                        "recipient",
                    ));
                }
            }
            Category::Education => {}
        }

        if self.category.is_upfront_priced() {
            match self.amount {
                Some(amount) if amount > Decimal::ZERO => {}
                Some(_) => return Err(invalid("amount must be greater than zero", "amount")),
                None => return Err(invalid("amount is required for this category", "amount")),
            }
        }

        if self.category.requires_plan()
            && self
                .plan_or_service_id
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(invalid(
                "plan_or_service_id is required for this category",
                "plan_or_service_id",
            ));
        }

        if self.category == Category::Electricity && self.meter_type.is_none() {
            return Err(invalid("meter_type is required for electricity", "meter_type"));
        }

        if self.category == Category::Education && self.quantity == Some(0) {
            return Err(invalid("quantity must be at least 1", "quantity"));
        }

        Ok(())
    }
}

fn invalid(message: &str, field: &str) -> FulfillmentError {
    FulfillmentError::InvalidRequest {
        message: message.to_string(),
        field: Some(field.to_string()),
    }
}

/// Why an upstream call did not produce a usable reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamFailure {
    Timeout,
    Network,
    Server,
    Malformed,
    Rejected,
}

impl UpstreamFailure {
    pub fn is_transient(&self) -> bool {
        !matches!(self, UpstreamFailure::Rejected)
    }
}

/// Normalized outcome of one adapter call. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderResult {
    pub provider: ProviderId,
    pub success: bool,
    pub upstream_reference: String,
    /// Provider's cost in major currency units.
    pub raw_amount_charged: Decimal,
    pub token: Option<String>,
    pub message: String,
    pub is_transient: bool,
    pub failure: Option<UpstreamFailure>,
}

impl ProviderResult {
    pub fn fulfilled(
        provider: ProviderId,
        upstream_reference: impl Into<String>,
        raw_amount_charged: Decimal,
        token: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            success: true,
            upstream_reference: upstream_reference.into(),
            raw_amount_charged,
            token,
            message: message.into(),
            is_transient: false,
            failure: None,
        }
    }

    pub fn failed(provider: ProviderId, failure: UpstreamFailure, message: impl Into<String>) -> Self {
        Self {
            provider,
            success: false,
            upstream_reference: String::new(),
            raw_amount_charged: Decimal::ZERO,
            token: None,
            message: message.into(),
            is_transient: failure.is_transient(),
            failure: Some(failure),
        }
    }

    pub fn rejected(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::failed(provider, UpstreamFailure::Rejected, message)
    }
}

/// One purchasable plan from a provider catalog. `price` is in major units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogPlan {
    pub plan_id: String,
    pub name: String,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn airtime() -> PurchaseRequest {
        PurchaseRequest {
            category: Category::Airtime,
            carrier_or_biller: "MTN".to_string(),
            recipient: "08031234567".to_string(),
            plan_or_service_id: None,
            amount: Some(dec!(500)),
            meter_type: None,
            quantity: None,
        }
    }

    #[test]
    fn category_parsing_accepts_aliases() {
        assert_eq!(Category::from_str("cable_tv").unwrap(), Category::Cable);
        assert_eq!(Category::from_str(" DATA ").unwrap(), Category::Data);
        assert!(Category::from_str("water").is_err());
    }

    #[test]
    fn request_deserializes_from_snake_case_json() {
        let request: PurchaseRequest = serde_json::from_value(serde_json::json!({
            "category": "electricity",
            "carrier_or_biller": "ikeja-electric",
            "recipient": "45012345678",
            "amount": "2500.50",
            "meter_type": "postpaid"
        }))
        .expect("request should deserialize");
        assert_eq!(request.category, Category::Electricity);
        assert_eq!(request.amount, Some(dec!(2500.50)));
        assert_eq!(request.meter_type, Some(MeterType::Postpaid));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn airtime_requires_positive_amount() {
        let mut request = airtime();
        assert!(request.validate().is_ok());
        request.amount = Some(Decimal::ZERO);
        assert!(request.validate().is_err());
        request.amount = None;
        assert!(request.validate().is_err());
    }

    #[test]
    fn data_requires_plan_and_phone() {
        let mut request = airtime();
        request.category = Category::Data;
        request.amount = None;
        assert!(request.validate().is_err());

        request.plan_or_service_id = Some("mtn-1gb".to_string());
        assert!(request.validate().is_ok());

        request.recipient = "12345".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn electricity_requires_meter_type() {
        let request = PurchaseRequest {
            category: Category::Electricity,
            carrier_or_biller: "ikeja-electric".to_string(),
            recipient: "45012345678".to_string(),
            plan_or_service_id: None,
            amount: Some(dec!(1000)),
            meter_type: None,
            quantity: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn failed_results_carry_transient_flag() {
        let timeout = ProviderResult::failed(ProviderId::ProviderA, UpstreamFailure::Timeout, "t");
        assert!(!timeout.success);
        assert!(timeout.is_transient);

        let rejected = ProviderResult::rejected(ProviderId::ProviderB, "invalid meter");
        assert!(!rejected.is_transient);
        assert_eq!(rejected.failure, Some(UpstreamFailure::Rejected));
    }
}
