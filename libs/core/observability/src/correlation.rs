//! Correlation-ID propagation.
//!
//! Every request gets a correlation ID: either the one supplied by the
//! caller in `x-correlation-id`, or a fresh UUID. The ID is stored as a
//! request extension for handlers, echoed on the response, and attached to
//! the request's tracing span so downstream logs carry it.

use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use uuid::Uuid;

/// Header carrying the correlation ID on requests and responses.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation ID threaded through a request's processing.
///
/// This is an explicit value handed from the HTTP layer into services and
/// stream payloads, so the ID survives process boundaries (webhook → stream
/// entry → worker → agent calls).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a fresh correlation ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Middleware that ensures every request carries a correlation ID.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response<Body> {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| CorrelationId(v.to_string()))
        .unwrap_or_else(CorrelationId::generate);

    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!("request", correlation_id = %correlation_id);
    let mut response = tracing::Instrument::instrument(next.run(request), span).await;

    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }

    response
}
