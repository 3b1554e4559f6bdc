//! The `{status, message, data}` envelope every endpoint answers with, the
//! error mapping into it, and caller identification.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use crate::error::FulfillmentError;

/// Header carrying the authenticated user id, set by the auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub status: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

#[derive(Debug)]
pub struct ApiError(pub FulfillmentError);

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        error!(error = %err, "system settings could not be loaded");
        ApiError(FulfillmentError::Configuration {
            message: err.to_string(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }

        let body = json!({
            "status": false,
            "message": err.user_message(),
            "data": {
                "error_code": err.error_code(),
                "retryable": err.is_retryable(),
                "transaction_id": err.transaction_id(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Caller identity taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or_else(|| {
                ApiError(FulfillmentError::InvalidRequest {
                    message: format!("{} header is required", USER_ID_HEADER),
                    field: Some(USER_ID_HEADER.to_string()),
                })
            })
    }
}
