use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::purchase::HistoryQuery;
use super::response::{ApiEnvelope, ApiError, CurrentUser};
use super::AppState;
use crate::database::error::StoreError;
use crate::database::models::{
    NewScheduledTransaction, ScheduledRequestFields, ScheduledTransaction,
};
use crate::error::FulfillmentError;
use crate::vending::types::PurchaseRequest;

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub request: PurchaseRequest,
    pub scheduled_time: DateTime<Utc>,
}

/// Quotes the purchase now and stores it with the charge locked in.
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ApiEnvelope<ScheduledTransaction>>), ApiError> {
    let settings = state.settings.load().await?;
    let request = body.request;
    let quote = state
        .fulfillment
        .quote(&request, &user_id, &settings)
        .await?;

    let fields = ScheduledRequestFields {
        carrier: request.carrier_or_biller.clone(),
        recipient: request.recipient.clone(),
        plan_id: request.plan_or_service_id.clone(),
        amount: quote.charge,
        face_value: if request.category.is_upfront_priced() {
            request.amount
        } else {
            None
        },
        meter_type: request.meter_type,
        quantity: request.quantity,
    };

    let record = state
        .schedules
        .create(NewScheduledTransaction {
            user_id: user_id.clone(),
            category: request.category,
            request_fields: fields,
            scheduled_time: body.scheduled_time,
        })
        .await
        .map_err(FulfillmentError::from)?;

    info!(
        user_id = %user_id,
        schedule_id = %record.id,
        category = %record.category,
        charge = %record.request_fields.amount,
        scheduled_time = %record.scheduled_time,
        "scheduled purchase created"
    );

    Ok((
        StatusCode::CREATED,
        ApiEnvelope::ok("purchase scheduled", record),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ApiEnvelope<Vec<ScheduledTransaction>>>, ApiError> {
    let records = state
        .schedules
        .list_for_user(&user_id, params.limit())
        .await
        .map_err(FulfillmentError::from)?;
    Ok(ApiEnvelope::ok("scheduled purchases retrieved", records))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiEnvelope<ScheduledTransaction>>, ApiError> {
    let not_found = || {
        FulfillmentError::Store(StoreError::NotFound {
            entity: "scheduled_transaction",
            id: id.to_string(),
        })
    };

    let record = state
        .schedules
        .get(id)
        .await
        .map_err(FulfillmentError::from)?
        .filter(|r| r.user_id == user_id)
        .ok_or_else(not_found)?;

    Ok(ApiEnvelope::ok("scheduled purchase retrieved", record))
}
