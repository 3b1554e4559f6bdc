//! Money-affecting settings: per-category routing and tier margins.
//!
//! A [`SystemConfig`] is loaded fresh once per API request and once per
//! scheduler cycle, then passed by reference to the router and the pricing
//! engine. Nothing holds it globally.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::config::ConfigError;
use crate::services::pricing::{PricingError, UserTier};
use crate::vending::types::{Category, ProviderId};

/// Environment prefix for overrides, e.g. `VENDORA__MARGINS__ADDITIVE__USER=40`.
pub const ENV_PREFIX: &str = "VENDORA";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingTable {
    #[serde(default)]
    pub airtime: Option<ProviderId>,
    #[serde(default)]
    pub data: Option<ProviderId>,
    #[serde(default)]
    pub electricity: Option<ProviderId>,
    #[serde(default)]
    pub cable: Option<ProviderId>,
    #[serde(default)]
    pub education: Option<ProviderId>,
}

impl RoutingTable {
    pub fn get(&self, category: Category) -> Option<ProviderId> {
        match category {
            Category::Airtime => self.airtime,
            Category::Data => self.data,
            Category::Electricity => self.electricity,
            Category::Cable => self.cable,
            Category::Education => self.education,
        }
    }

    pub fn set(&mut self, category: Category, provider: ProviderId) {
        let slot = match category {
            Category::Airtime => &mut self.airtime,
            Category::Data => &mut self.data,
            Category::Electricity => &mut self.electricity,
            Category::Cable => &mut self.cable,
            Category::Education => &mut self.education,
        };
        *slot = Some(provider);
    }
}

/// One margin per tier. Every tier must be present in the settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierMargins {
    pub user: Decimal,
    pub reseller: Decimal,
    pub api_merchant: Decimal,
    pub admin: Decimal,
}

impl TierMargins {
    pub fn for_tier(&self, tier: UserTier) -> Decimal {
        match tier {
            UserTier::User => self.user,
            UserTier::Reseller => self.reseller,
            UserTier::ApiMerchant => self.api_merchant,
            UserTier::Admin => self.admin,
        }
    }

    fn validate(&self, table: &'static str) -> Result<(), PricingError> {
        for tier in UserTier::ALL {
            let value = self.for_tier(tier);
            if value.is_sign_negative() && !value.is_zero() {
                return Err(PricingError::NegativeMargin { table, tier, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderSurcharges {
    #[serde(default)]
    pub provider_a: Decimal,
    #[serde(default)]
    pub provider_b: Decimal,
}

impl ProviderSurcharges {
    pub fn for_provider(&self, provider: ProviderId) -> Decimal {
        match provider {
            ProviderId::ProviderA => self.provider_a,
            ProviderId::ProviderB => self.provider_b,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarginConfig {
    /// Flat markup for data, cable and education.
    pub additive: TierMargins,
    /// Percent markup for airtime and electricity.
    pub percentage: TierMargins,
    /// Extra flat amount per provider, additive categories only.
    #[serde(default)]
    pub surcharges: ProviderSurcharges,
}

impl MarginConfig {
    pub fn validate(&self) -> Result<(), PricingError> {
        self.additive.validate("additive")?;
        self.percentage.validate("percentage")?;
        for provider in [ProviderId::ProviderA, ProviderId::ProviderB] {
            let value = self.surcharges.for_provider(provider);
            if value.is_sign_negative() && !value.is_zero() {
                return Err(PricingError::NegativeSurcharge { provider, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    #[serde(default)]
    pub routing: RoutingTable,
    pub margins: MarginConfig,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.margins.validate()?;
        Ok(())
    }

    /// Parses and validates a TOML settings document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(raw, ::config::FileFormat::Toml))
            .build()?;
        let parsed: SystemConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }
}

#[async_trait]
pub trait SystemConfigSource: Send + Sync {
    async fn load(&self) -> Result<SystemConfig, ConfigError>;
}

/// Reads the TOML settings document from disk on every `load`, layering
/// `VENDORA__`-prefixed environment variables on top.
#[derive(Debug, Clone)]
pub struct FileSystemConfigSource {
    path: PathBuf,
}

impl FileSystemConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SystemConfigSource for FileSystemConfigSource {
    async fn load(&self) -> Result<SystemConfig, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConfigError::Settings(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(&raw, ::config::FileFormat::Toml))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let parsed: SystemConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// In-process settings, swappable at runtime. Used by tests and embedders.
pub struct StaticSystemConfigSource {
    current: RwLock<SystemConfig>,
}

impl StaticSystemConfigSource {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    pub async fn replace(&self, config: SystemConfig) {
        *self.current.write().await = config;
    }
}

#[async_trait]
impl SystemConfigSource for StaticSystemConfigSource {
    async fn load(&self) -> Result<SystemConfig, ConfigError> {
        let config = self.current.read().await.clone();
        config.validate()?;
        Ok(config)
    }
}
