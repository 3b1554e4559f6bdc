//! Provider plumbing: request types, static quirk tables, the shared HTTP
//! client, the two concrete adapters and table-driven routing.

pub mod capabilities;
pub mod http;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod router;
pub mod types;

pub use provider::ProviderAdapter;
pub use registry::ProviderRegistry;
pub use router::{Router, RoutingError};
pub use types::{
    CatalogPlan, Category, MeterType, ProviderId, ProviderResult, PurchaseRequest,
    UpstreamFailure,
};
