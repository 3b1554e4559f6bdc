pub mod catalog;
pub mod fulfillment;
pub mod pricing;

pub use catalog::CatalogService;
pub use fulfillment::{CustomerLookup, FulfillmentService, PricedPlan, Quote};
pub use pricing::{PricingEngine, PricingError, UserTier};
