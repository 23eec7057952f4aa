//! Backpressure gate middleware.

use crate::load::{LoadLevel, LoadSnapshot};
use crate::{is_protected_path, AdmissionState};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde_json::json;
use std::time::Duration;
use tracing::error;

/// Per-request timeout for a load level.
pub fn timeout_for_level(level: LoadLevel) -> Duration {
    match level {
        LoadLevel::Low => Duration::from_secs(30),
        LoadLevel::Medium => Duration::from_secs(20),
        LoadLevel::High => Duration::from_secs(15),
        LoadLevel::Critical => Duration::from_secs(10),
    }
}

/// Backpressure middleware.
///
/// Rejects requests with 503 while the system is critically loaded and
/// bounds every admitted request with a load-dependent timeout. Responses
/// carry `X-System-Load` and `X-Queue-Depth` headers either way.
pub async fn backpressure_middleware(
    State(state): State<AdmissionState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if is_protected_path(request.uri().path()) {
        return next.run(request).await;
    }

    let snapshot = state.monitor.snapshot().await;

    if snapshot.is_overloaded() {
        counter!("requests_rejected_total", "reason" => "overloaded").increment(1);
        return overload_response(&snapshot);
    }

    let timeout = timeout_for_level(snapshot.level);
    let path = request.uri().path().to_string();

    let mut response = match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            error!(path = %path, timeout_secs = %timeout.as_secs(), "Request timed out under load");
            counter!("requests_rejected_total", "reason" => "timeout").increment(1);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "Request timeout",
                    "timeout_seconds": timeout.as_secs(),
                })),
            )
                .into_response()
        }
    };

    attach_load_headers(&mut response, &snapshot);
    response
}

fn overload_response(snapshot: &LoadSnapshot) -> Response<Body> {
    let retry_after = snapshot.retry_after_secs();

    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "System overloaded",
            "message": "Please retry later",
            "load_info": {
                "load_level": snapshot.level.as_str(),
                "queue_depth": snapshot.stream_length,
                "pending_messages": snapshot.pending_count,
            },
            "retry_after_seconds": retry_after,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(
        "Retry-After",
        HeaderValue::from_str(&retry_after.to_string()).unwrap_or(HeaderValue::from_static("10")),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    attach_load_headers(&mut response, snapshot);
    response
}

fn attach_load_headers(response: &mut Response<Body>, snapshot: &LoadSnapshot) {
    let headers = response.headers_mut();
    headers.insert(
        "X-System-Load",
        HeaderValue::from_static(match snapshot.level {
            LoadLevel::Low => "low",
            LoadLevel::Medium => "medium",
            LoadLevel::High => "high",
            LoadLevel::Critical => "critical",
        }),
    );
    if let Ok(depth) = HeaderValue::from_str(&snapshot.stream_length.to_string()) {
        headers.insert("X-Queue-Depth", depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_shrink_with_load() {
        assert_eq!(timeout_for_level(LoadLevel::Low), Duration::from_secs(30));
        assert_eq!(timeout_for_level(LoadLevel::Medium), Duration::from_secs(20));
        assert_eq!(timeout_for_level(LoadLevel::High), Duration::from_secs(15));
        assert_eq!(
            timeout_for_level(LoadLevel::Critical),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_overload_response_headers() {
        let snapshot = LoadSnapshot::compute(150, 0, 0, 100);
        let response = overload_response(&snapshot);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("X-System-Load").unwrap(),
            "critical"
        );
        assert_eq!(response.headers().get("X-Queue-Depth").unwrap(), "150");

        let retry_after: u64 = response
            .headers()
            .get("Retry-After")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((10..=60).contains(&retry_after));
    }
}
