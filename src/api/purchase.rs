use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use super::response::{ApiEnvelope, ApiError, CurrentUser};
use super::AppState;
use crate::database::models::Transaction;
use crate::services::fulfillment::{CustomerLookup, PricedPlan, Quote};
use crate::vending::types::{Category, PurchaseRequest};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub carrier: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub category: Category,
    pub carrier: String,
    pub plans: Vec<PricedPlan>,
}

pub async fn purchase(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<ApiEnvelope<Transaction>>, ApiError> {
    info!(user_id = %user_id, category = %request.category, "purchase request");
    let settings = state.settings.load().await?;
    let tx = state
        .fulfillment
        .purchase(&request, &user_id, &settings)
        .await?;
    Ok(ApiEnvelope::ok(tx.message.clone(), tx))
}

pub async fn quote(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<ApiEnvelope<Quote>>, ApiError> {
    let settings = state.settings.load().await?;
    let quote = state
        .fulfillment
        .quote(&request, &user_id, &settings)
        .await?;
    Ok(ApiEnvelope::ok("quote computed", quote))
}

pub async fn validate_recipient(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<ApiEnvelope<CustomerLookup>>, ApiError> {
    info!(user_id = %user_id, category = %request.category, "recipient lookup");
    let settings = state.settings.load().await?;
    let lookup = state
        .fulfillment
        .validate_recipient(&request, &settings)
        .await?;
    Ok(ApiEnvelope::ok("recipient verified", lookup))
}

pub async fn catalog(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(category): Path<String>,
    Query(params): Query<CatalogQuery>,
) -> Result<Json<ApiEnvelope<CatalogResponse>>, ApiError> {
    let category = Category::from_str(&category)?;
    let settings = state.settings.load().await?;
    let plans = state
        .fulfillment
        .priced_catalog(category, &params.carrier, &user_id, &settings)
        .await?;
    Ok(ApiEnvelope::ok(
        "catalog retrieved",
        CatalogResponse {
            category,
            carrier: params.carrier,
            plans,
        },
    ))
}

pub async fn transactions(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ApiEnvelope<Vec<Transaction>>>, ApiError> {
    let records = state
        .ledger
        .list_for_user(&user_id, params.limit())
        .await
        .map_err(crate::error::FulfillmentError::from)?;
    Ok(ApiEnvelope::ok("transactions retrieved", records))
}
