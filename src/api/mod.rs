//! Internal purchase API.

pub mod purchase;
pub mod response;
pub mod scheduled;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::database::store::{ScheduleStore, TransactionLedger};
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::services::fulfillment::FulfillmentService;
use crate::system_config::SystemConfigSource;

#[derive(Clone)]
pub struct AppState {
    pub fulfillment: FulfillmentService,
    pub settings: Arc<dyn SystemConfigSource>,
    pub ledger: Arc<dyn TransactionLedger>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub health_checker: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/purchase", post(purchase::purchase))
        .route("/api/quote", post(purchase::quote))
        .route("/api/validate", post(purchase::validate_recipient))
        .route("/api/catalog/{category}", get(purchase::catalog))
        .route("/api/transactions", get(purchase::transactions))
        .route(
            "/api/scheduled",
            post(scheduled::create).get(scheduled::list),
        )
        .route("/api/scheduled/{id}", get(scheduled::get))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let status = state.health_checker.check_health().await;
    if status.status == HealthState::Unhealthy {
        error!("health check failed");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(status)))
    } else {
        info!(status = ?status.status, "health check passed");
        Ok(Json(status))
    }
}
