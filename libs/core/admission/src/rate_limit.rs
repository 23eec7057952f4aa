//! Per-client sliding-window rate limiter backed by a Redis sorted set.

use crate::{is_protected_path, AdmissionState};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;
use metrics::counter;
use redis::aio::ConnectionManager;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Seconds until the client may try again (when rejected).
    pub retry_after_secs: u64,
}

/// Sliding-window counter per client identifier.
///
/// Atomically (one pipeline): insert the current timestamp into the client's
/// sorted set, drop entries older than the window, count what is left, and
/// refresh the key's TTL. The count is compared to the limit afterwards.
pub struct SlidingWindowLimiter {
    redis: ConnectionManager,
    requests_per_minute: u64,
    window_seconds: u64,
}

impl SlidingWindowLimiter {
    pub fn new(redis: ConnectionManager, requests_per_minute: u64, window_seconds: u64) -> Self {
        Self {
            redis,
            requests_per_minute,
            window_seconds,
        }
    }

    pub fn limit(&self) -> u64 {
        self.requests_per_minute
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Check (and count) one request for the client.
    ///
    /// Redis failures fail open: the request is admitted and logged, because
    /// dropping traffic on a limiter outage is worse than briefly not
    /// limiting it.
    pub async fn check(&self, client_id: &str) -> RateDecision {
        match self.check_inner(client_id).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Rate limit check failed, admitting");
                RateDecision {
                    allowed: true,
                    remaining: self.requests_per_minute,
                    retry_after_secs: self.window_seconds,
                }
            }
        }
    }

    async fn check_inner(&self, client_id: &str) -> Result<RateDecision, redis::RedisError> {
        let mut conn = self.redis.clone();
        let key = format!("rate_limit:{}", client_id);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let window_start = now - self.window_seconds as f64;
        let member = format!("{:.6}", now);

        let (_, _, request_count, _): ((), (), u64, ()) = redis::pipe()
            .zadd(&key, &member, now)
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg(0)
            .arg(window_start)
            .cmd("ZCARD")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.window_seconds + 1)
            .query_async(&mut conn)
            .await?;

        if request_count > self.requests_per_minute {
            // Reset when the oldest request in the window ages out
            let oldest: Vec<(String, f64)> = redis::cmd("ZRANGE")
                .arg(&key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
                .unwrap_or_default();

            let retry_after_secs = oldest
                .first()
                .map(|(_, oldest_at)| {
                    let reset_at = oldest_at + self.window_seconds as f64;
                    (reset_at - now).ceil().max(1.0) as u64
                })
                .unwrap_or(self.window_seconds);

            return Ok(RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs,
            });
        }

        Ok(RateDecision {
            allowed: true,
            remaining: self.requests_per_minute.saturating_sub(request_count),
            retry_after_secs: self.window_seconds,
        })
    }
}

/// Derive the client identifier for rate limiting.
///
/// Precedence: `X-Client-ID` header, API key prefix, bearer token prefix,
/// remote IP. Key and token prefixes are truncated so full credentials never
/// land in Redis keys or logs.
pub fn client_id_from_request(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(client_id) = headers.get("x-client-id").and_then(|v| v.to_str().ok()) {
        if !client_id.is_empty() {
            return format!("client:{}", client_id);
        }
    }

    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !api_key.is_empty() {
            let prefix: String = api_key.chars().take(8).collect();
            return format!("api_key:{}", prefix);
        }
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            let prefix: String = token.chars().take(8).collect();
            return format!("token:{}", prefix);
        }
    }

    match remote {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "unknown".to_string(),
    }
}

/// Rate-limit middleware.
///
/// The remote address is read from the `ConnectInfo` extension, present
/// when the app is served with `into_make_service_with_connect_info`.
pub async fn rate_limit_middleware(
    State(state): State<AdmissionState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if is_protected_path(request.uri().path()) {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client_id = client_id_from_request(request.headers(), remote);
    let decision = state.limiter.check(&client_id).await;

    if !decision.allowed {
        counter!("requests_rejected_total", "reason" => "rate_limited").increment(1);
        return rate_limited_response(&state, &decision);
    }

    let mut response = next.run(request).await;
    attach_rate_headers(&mut response, &state, decision.remaining);
    response
}

fn rate_limited_response(state: &AdmissionState, decision: &RateDecision) -> Response<Body> {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Rate limit exceeded",
            "retry_after": decision.retry_after_secs,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.retry_after_secs.to_string()) {
        headers.insert("Retry-After", value);
    }
    if let Ok(value) = HeaderValue::from_str(&state.limiter.limit().to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    response
}

fn attach_rate_headers(response: &mut Response<Body>, state: &AdmissionState, remaining: u64) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&state.limiter.limit().to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&state.limiter.window_seconds().to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
}
