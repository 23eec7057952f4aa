//! Application-specific health handlers with real dependency checks.
//!
//! - Redis (the stream backend) is a hard dependency: unreachable → 503.
//! - The gateway is soft: unreachable → `degraded`, still 200.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;

/// Liveness: the process answers.
///
/// `GET /health` and `GET /health/live`
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.config.app.name,
        "version": state.config.app.version,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness: verifies the dependencies this service needs to admit traffic.
///
/// `GET /health/ready`
pub async fn ready_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let started = Instant::now();

    // Redis carries the stream, the locks and the idempotency set: hard
    let mut conn = state.redis.clone();
    let redis_ok = redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map(|pong| pong == "PONG")
        .unwrap_or(false);

    // The gateway only matters for replies: soft
    let gateway_ok = state.sender.reachable().await;

    let status = if !redis_ok {
        "unhealthy"
    } else if !gateway_ok {
        "degraded"
    } else {
        "healthy"
    };

    let code = if redis_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "checks": {
                "redis": if redis_ok { "healthy" } else { "unhealthy" },
                "gateway": if gateway_ok { "healthy" } else { "unreachable" },
            },
            "check_duration_ms": started.elapsed().as_millis() as u64,
        })),
    )
}

/// Service banner.
///
/// `GET /`
pub async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.config.app.name,
        "version": state.config.app.version,
        "status": "running",
    }))
}
