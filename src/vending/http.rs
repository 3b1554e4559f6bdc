use reqwest::{Client, Method, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::vending::types::UpstreamFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    Network,
    Malformed,
    Server,
}

impl UpstreamErrorKind {
    pub fn as_failure(&self) -> UpstreamFailure {
        match self {
            UpstreamErrorKind::Timeout => UpstreamFailure::Timeout,
            UpstreamErrorKind::Network => UpstreamFailure::Network,
            UpstreamErrorKind::Malformed => UpstreamFailure::Malformed,
            UpstreamErrorKind::Server => UpstreamFailure::Server,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Malformed, message)
    }
}

/// Parsed upstream reply. Client errors (4xx) that carry a JSON body are
/// handed back so the adapter can read the provider's rejection message.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: JsonValue,
}

/// Shared reqwest client for provider calls. Every request is bounded by
/// `timeout`; no retries happen at this layer.
#[derive(Clone)]
pub struct VendingHttpClient {
    client: Client,
    timeout: Duration,
}

impl VendingHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            UpstreamError::new(
                UpstreamErrorKind::Network,
                format!("failed to initialize HTTP client: {}", e),
            )
        })?;

        Ok(Self { client, timeout })
    }

    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&JsonValue>,
    ) -> Result<UpstreamReply, UpstreamError> {
        let mut request = self.client.request(method, url).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;

        if status.is_server_error() {
            warn!(status = %status, "provider server error");
            return Err(UpstreamError::new(
                UpstreamErrorKind::Server,
                format!("HTTP {}", status),
            ));
        }

        let body = serde_json::from_str::<JsonValue>(&text).map_err(|e| {
            UpstreamError::malformed(format!("HTTP {} with non-JSON body: {}", status, e))
        })?;

        if !status.is_success() && !status.is_client_error() {
            return Err(UpstreamError::malformed(format!(
                "unexpected HTTP status {}",
                status
            )));
        }

        Ok(UpstreamReply { status, body })
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::new(UpstreamErrorKind::Timeout, "provider request timed out")
    } else if err.is_decode() || err.is_body() {
        UpstreamError::malformed(format!("failed to read provider response: {}", err))
    } else {
        UpstreamError::new(
            UpstreamErrorKind::Network,
            format!("provider request failed: {}", err),
        )
    }
}
