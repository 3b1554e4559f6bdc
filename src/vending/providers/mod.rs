pub mod provider_a;
pub mod provider_b;

pub use provider_a::ProviderAAdapter;
pub use provider_b::ProviderBAdapter;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::vending::http::{UpstreamError, UpstreamReply};
use crate::vending::normalize::{status_is_success, text_field};
use crate::vending::types::{Category, ProviderId, ProviderResult, UpstreamFailure};

/// The `{status, message, data}` shape both providers answer with.
pub(crate) struct Envelope<'a> {
    pub succeeded: bool,
    pub message: String,
    /// `data` when present, otherwise the whole body.
    pub data: &'a JsonValue,
}

pub(crate) fn read_envelope(reply: &UpstreamReply) -> Result<Envelope<'_>, UpstreamError> {
    let status = reply
        .body
        .get("status")
        .ok_or_else(|| UpstreamError::malformed("response has no status field"))?;
    let message = text_field(&reply.body, &["message", "error", "detail"]).unwrap_or_default();
    let data = match reply.body.get("data") {
        Some(inner) if !inner.is_null() => inner,
        _ => &reply.body,
    };

    Ok(Envelope {
        succeeded: reply.status.is_success() && status_is_success(status),
        message,
        data,
    })
}

/// Folds a transport or parse error into a failed result.
pub(crate) fn failure_result(
    provider: ProviderId,
    category: Category,
    path: &str,
    err: UpstreamError,
) -> ProviderResult {
    let failure = err.kind.as_failure();
    warn!(
        provider = %provider,
        category = %category,
        path = path,
        failure = ?failure,
        error = %err.message,
        "provider call failed"
    );
    ProviderResult::failed(provider, failure, err.message)
}

pub(crate) fn rejection(provider: ProviderId, message: &str) -> ProviderResult {
    let message = if message.trim().is_empty() {
        "provider rejected the request"
    } else {
        message
    };
    ProviderResult::rejected(provider, message)
}

pub(crate) fn unsupported(provider: ProviderId, category: Category, what: &str) -> ProviderResult {
    ProviderResult::failed(
        provider,
        UpstreamFailure::Rejected,
        format!("{} does not support {} for {}", provider, what, category),
    )
}
