use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::system_config::MarginConfig;
use crate::vending::types::{Category, ProviderId};

/// Decimal places charges are rounded to.
pub const CHARGE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    User,
    Reseller,
    ApiMerchant,
    Admin,
}

impl UserTier {
    pub const ALL: [UserTier; 4] = [
        UserTier::User,
        UserTier::Reseller,
        UserTier::ApiMerchant,
        UserTier::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::User => "user",
            UserTier::Reseller => "reseller",
            UserTier::ApiMerchant => "api_merchant",
            UserTier::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserTier {
    type Err = PricingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "user" => Ok(UserTier::User),
            "reseller" => Ok(UserTier::Reseller),
            "api_merchant" | "api" => Ok(UserTier::ApiMerchant),
            "admin" => Ok(UserTier::Admin),
            other => Err(PricingError::UnknownTier(other.to_string())),
        }
    }
}

/// How a category's margin is applied on top of the provider cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginKind {
    /// Flat currency markup, plus any provider surcharge.
    Additive,
    /// Markup as a percentage of the base cost.
    Percentage,
}

impl MarginKind {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Data | Category::Cable | Category::Education => MarginKind::Additive,
            Category::Airtime | Category::Electricity => MarginKind::Percentage,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PricingError {
    #[error("negative {table} margin {value} for tier {tier}")]
    NegativeMargin {
        table: &'static str,
        tier: UserTier,
        value: Decimal,
    },

    #[error("negative surcharge {value} for provider {provider}")]
    NegativeSurcharge { provider: ProviderId, value: Decimal },

    #[error("negative base cost {0}")]
    NegativeBaseCost(Decimal),

    #[error("charge computation overflowed for base cost {0}")]
    Overflow(Decimal),

    #[error("unknown user tier: {0}")]
    UnknownTier(String),
}

/// Stateless: the same inputs always price the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine;

impl PricingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Additive: `base + margin[tier] + surcharge[provider]`.
    /// Percentage: `base * (1 + margin[tier] / 100)`.
    ///
    /// The result is rounded up to [`CHARGE_SCALE`] places so it never falls
    /// below `base_cost`.
    pub fn compute_charge(
        &self,
        base_cost: Decimal,
        category: Category,
        provider: ProviderId,
        tier: UserTier,
        margins: &MarginConfig,
    ) -> Result<Decimal, PricingError> {
        if base_cost.is_sign_negative() && !base_cost.is_zero() {
            return Err(PricingError::NegativeBaseCost(base_cost));
        }
        margins.validate()?;

        let charge = match MarginKind::for_category(category) {
            MarginKind::Additive => {
                let margin = margins.additive.for_tier(tier);
                let surcharge = margins.surcharges.for_provider(provider);
                base_cost
                    .checked_add(margin)
                    .and_then(|v| v.checked_add(surcharge))
            }
            MarginKind::Percentage => {
                let margin = margins.percentage.for_tier(tier);
                let factor = Decimal::ONE + margin / Decimal::ONE_HUNDRED;
                base_cost.checked_mul(factor)
            }
        }
        .ok_or(PricingError::Overflow(base_cost))?;

        Ok(charge.round_dp_with_strategy(CHARGE_SCALE, RoundingStrategy::ToPositiveInfinity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_config::{ProviderSurcharges, TierMargins};
    use rust_decimal_macros::dec;

    fn margins() -> MarginConfig {
        MarginConfig {
            additive: TierMargins {
                user: dec!(50),
                reseller: dec!(30),
                api_merchant: dec!(20),
                admin: dec!(0),
            },
            percentage: TierMargins {
                user: dec!(2.5),
                reseller: dec!(1.5),
                api_merchant: dec!(1),
                admin: dec!(0),
            },
            surcharges: ProviderSurcharges {
                provider_a: dec!(0),
                provider_b: dec!(5),
            },
        }
    }

    #[test]
    fn additive_categories_add_flat_margin_and_surcharge() {
        let engine = PricingEngine::new();
        let charge = engine
            .compute_charge(
                dec!(10),
                Category::Data,
                ProviderId::ProviderB,
                UserTier::User,
                &margins(),
            )
            .unwrap();
        assert_eq!(charge, dec!(65));

        let charge = engine
            .compute_charge(
                dec!(10),
                Category::Cable,
                ProviderId::ProviderA,
                UserTier::Reseller,
                &margins(),
            )
            .unwrap();
        assert_eq!(charge, dec!(40));
    }

    #[test]
    fn percentage_categories_scale_the_base_cost() {
        let engine = PricingEngine::new();
        let charge = engine
            .compute_charge(
                dec!(1000),
                Category::Airtime,
                ProviderId::ProviderA,
                UserTier::User,
                &margins(),
            )
            .unwrap();
        assert_eq!(charge, dec!(1025));

        // surcharges never apply to percentage categories
        let charge = engine
            .compute_charge(
                dec!(1000),
                Category::Electricity,
                ProviderId::ProviderB,
                UserTier::Admin,
                &margins(),
            )
            .unwrap();
        assert_eq!(charge, dec!(1000));
    }

    #[test]
    fn charge_rounds_up_to_two_places() {
        let engine = PricingEngine::new();
        let charge = engine
            .compute_charge(
                dec!(33.33),
                Category::Airtime,
                ProviderId::ProviderA,
                UserTier::User,
                &margins(),
            )
            .unwrap();
        // 33.33 * 1.025 = 34.16325
        assert_eq!(charge, dec!(34.17));
    }

    #[test]
    fn charge_never_below_base_cost_for_any_tier_or_category() {
        let engine = PricingEngine::new();
        let config = margins();
        for base in [dec!(0), dec!(0.001), dec!(9.999), dec!(100), dec!(123456.789)] {
            for tier in UserTier::ALL {
                for category in Category::ALL {
                    for provider in [ProviderId::ProviderA, ProviderId::ProviderB] {
                        let first = engine
                            .compute_charge(base, category, provider, tier, &config)
                            .unwrap();
                        let second = engine
                            .compute_charge(base, category, provider, tier, &config)
                            .unwrap();
                        assert!(first >= base, "{} < {} for {} {}", first, base, tier, category);
                        assert_eq!(first, second);
                    }
                }
            }
        }
    }

    #[test]
    fn negative_margin_is_rejected() {
        let mut config = margins();
        config.additive.reseller = dec!(-1);
        let err = PricingEngine::new()
            .compute_charge(
                dec!(100),
                Category::Data,
                ProviderId::ProviderA,
                UserTier::User,
                &config,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PricingError::NegativeMargin {
                tier: UserTier::Reseller,
                ..
            }
        ));
    }

    #[test]
    fn negative_base_cost_is_rejected() {
        let err = PricingEngine::new()
            .compute_charge(
                dec!(-5),
                Category::Data,
                ProviderId::ProviderA,
                UserTier::User,
                &margins(),
            )
            .unwrap_err();
        assert_eq!(err, PricingError::NegativeBaseCost(dec!(-5)));
    }

    #[test]
    fn tier_parsing() {
        assert_eq!(UserTier::from_str("API_MERCHANT").unwrap(), UserTier::ApiMerchant);
        assert!(UserTier::from_str("gold").is_err());
    }
}
