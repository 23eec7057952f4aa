//! Health check and DLQ admin handlers.
//!
//! This module provides reusable Axum handlers for:
//! - Liveness probes (`/health`, `/health/live`)
//! - Readiness probes (`/health/ready`)
//! - Stream monitoring (`/stream/info`)
//! - Prometheus metrics (`/metrics`)
//! - DLQ admin endpoints (`/admin/dlq/*`), gated by a static bearer token

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use crate::dlq::{DlqFilter, DlqManager};
use crate::error::DlqCategory;
use crate::metrics;

/// Shared state for health and admin endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Redis connection for health checks.
    pub redis: ConnectionManager,
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Stream name for monitoring.
    pub stream_name: String,
    /// DLQ stream name.
    pub dlq_stream_name: String,
    /// Static bearer token for the admin surface. `None` locks it out.
    pub admin_token: Option<String>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl HealthState {
    /// Create a new health state; the DLQ stream defaults to `{stream}:dlq`.
    pub fn new(
        redis: ConnectionManager,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Self {
        let stream = stream_name.into();
        let dlq = format!("{}:dlq", stream);
        Self {
            redis,
            app_name: app_name.into(),
            app_version: app_version.into(),
            stream_name: stream,
            dlq_stream_name: dlq,
            admin_token: None,
            started_at: Instant::now(),
        }
    }

    /// Set the bearer token gating the DLQ admin endpoints.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    /// Get a DLQ manager for this state.
    pub fn dlq_manager(&self) -> DlqManager {
        DlqManager::new(
            self.redis.clone(),
            &self.stream_name,
            &self.dlq_stream_name,
        )
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
        let Some(expected) = &self.admin_token else {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "DLQ admin surface is disabled" })),
            ));
        };

        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match supplied {
            Some(token) if token == expected => Ok(()),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid or missing admin token" })),
            )),
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: &'static str,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Liveness probe with uptime.
pub async fn live_handler(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "service": state.app_name,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Readiness probe handler.
///
/// Checks Redis connectivity; the stream backend is a hard dependency.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut conn = state.redis.clone();

    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;

    match result {
        Ok(response) if response == "PONG" => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": {
                    "redis": "ok"
                }
            })),
        )),
        Ok(response) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": {
                    "redis": format!("unexpected response: {}", response)
                }
            })),
        )),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": {
                    "redis": format!("error: {}", e)
                }
            })),
        )),
    }
}

/// Stream info handler for monitoring.
///
/// Returns queue depth, entry IDs, and consumer group info.
pub async fn stream_info_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = state.redis.clone();

    let result: Result<redis::streams::StreamInfoStreamReply, _> = redis::cmd("XINFO")
        .arg("STREAM")
        .arg(&state.stream_name)
        .query_async(&mut conn)
        .await;

    let dlq_length: u64 = redis::cmd("XLEN")
        .arg(&state.dlq_stream_name)
        .query_async(&mut conn)
        .await
        .unwrap_or(0);

    match result {
        Ok(info) => Ok(Json(json!({
            "stream": state.stream_name,
            "length": info.length,
            "first_entry_id": info.first_entry.id,
            "last_entry_id": info.last_entry.id,
            "groups": info.groups,
            "dlq_length": dlq_length,
        }))),
        Err(e) => {
            let err_str = e.to_string();
            if err_str.contains("no such key") || err_str.contains("ERR") {
                // Stream doesn't exist yet (no entries queued)
                Ok(Json(json!({
                    "stream": state.stream_name,
                    "length": 0,
                    "first_entry_id": null,
                    "last_entry_id": null,
                    "dlq_length": dlq_length,
                    "message": "Stream does not exist yet (no entries queued)"
                })))
            } else {
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": format!("Failed to get stream info: {}", e)
                    })),
                ))
            }
        }
    }
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::get_metrics_handle() {
        Some(handle) => {
            let metrics_output = handle.render();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                metrics_output,
            )
                .into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call metrics::init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

// ============================================================================
// DLQ Admin Handlers
// ============================================================================

/// Query parameters for DLQ list endpoint.
#[derive(Debug, Deserialize)]
pub struct DlqListParams {
    /// Maximum number of entries to return (default: 25, max: 100)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Restrict to entries failed within the last N hours
    pub hours_back: Option<i64>,
    /// Filter by message kind
    pub message_type: Option<String>,
    /// Filter by error category
    pub error_category: Option<String>,
}

fn default_limit() -> usize {
    25
}

/// Query parameters for the reprocess endpoint.
#[derive(Debug, Deserialize)]
pub struct DlqReprocessParams {
    /// Reset the retry counter on the republished entry (default: true)
    #[serde(default = "default_true")]
    pub reset_retry_count: bool,
    /// Republish into a different stream instead of the original
    pub target_queue: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Body for the bulk reprocess endpoint.
#[derive(Debug, Deserialize)]
pub struct BulkReprocessRequest {
    pub ids: Vec<String>,
    pub target_queue: Option<String>,
}

/// Query parameters for the purge endpoint.
#[derive(Debug, Deserialize)]
pub struct DlqPurgeParams {
    #[serde(default = "default_purge_days")]
    pub older_than_days: i64,
}

fn default_purge_days() -> i64 {
    7
}

/// Query parameters for the analyze endpoint.
#[derive(Debug, Deserialize)]
pub struct DlqAnalyzeParams {
    #[serde(default = "default_analyze_hours")]
    pub hours_back: i64,
}

fn default_analyze_hours() -> i64 {
    24
}

/// Get DLQ statistics.
///
/// `GET /admin/dlq/stats`
pub async fn dlq_stats_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    match manager.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// List entries in the DLQ with optional filters.
///
/// `GET /admin/dlq/messages?limit=25&hours_back=24&message_type=text&error_category=timeout`
pub async fn dlq_list_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Query(params): Query<DlqListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    let error_category = match params.error_category.as_deref() {
        Some(raw) => Some(raw.parse::<DlqCategory>().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e })),
            )
        })?),
        None => None,
    };

    let filter = DlqFilter {
        limit: params.limit.min(100),
        start_time: params
            .hours_back
            .map(|h| chrono::Utc::now() - chrono::Duration::hours(h)),
        end_time: None,
        message_kind: params.message_type,
        error_category,
    };

    match manager.list(&filter).await {
        Ok(entries) => Ok(Json(json!({
            "count": entries.len(),
            "entries": entries,
        }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Reprocess a single entry from the DLQ back into the primary stream.
///
/// `POST /admin/dlq/reprocess/{queue}/{id}?reset_retry_count=true`
pub async fn dlq_reprocess_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Path((queue, entry_id)): Path<(String, String)>,
    Query(params): Query<DlqReprocessParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;

    if queue != state.stream_name {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown queue: {}", queue) })),
        ));
    }

    let manager = state.dlq_manager();

    match manager
        .reprocess(
            &entry_id,
            params.target_queue.as_deref(),
            params.reset_retry_count,
        )
        .await
    {
        Ok(true) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "entry_id": entry_id,
                "message": "Entry requeued for processing"
            })),
        )),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Entry not found in DLQ",
                "entry_id": entry_id
            })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Reprocess a batch of entries; returns per-ID outcomes.
///
/// `POST /admin/dlq/bulk-reprocess` with `{"ids": [...], "target_queue": null}`
pub async fn dlq_bulk_reprocess_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Json(request): Json<BulkReprocessRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    match manager
        .bulk_reprocess(&request.ids, request.target_queue.as_deref())
        .await
    {
        Ok(results) => {
            let succeeded = results.values().filter(|ok| **ok).count();
            Ok(Json(json!({
                "requested": request.ids.len(),
                "succeeded": succeeded,
                "results": results,
            })))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Analyze failure patterns in the DLQ.
///
/// `GET /admin/dlq/analyze?hours_back=24`
pub async fn dlq_analyze_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Query(params): Query<DlqAnalyzeParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    match manager.analyze(params.hours_back).await {
        Ok(analysis) => Ok(Json(analysis)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Purge entries older than the given age.
///
/// `DELETE /admin/dlq/purge?older_than_days=7`
pub async fn dlq_purge_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Query(params): Query<DlqPurgeParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    match manager.purge_older_than(params.older_than_days).await {
        Ok(count) => Ok(Json(json!({
            "success": true,
            "purged_count": count,
            "older_than_days": params.older_than_days,
        }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Delete a single entry without reprocessing it.
///
/// `DELETE /admin/dlq/{id}`
pub async fn dlq_delete_handler(
    State(state): State<HealthState>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    state.authorize(&headers)?;
    let manager = state.dlq_manager();

    match manager.delete(&entry_id).await {
        Ok(true) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "entry_id": entry_id,
            })),
        )),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Entry not found in DLQ",
                "entry_id": entry_id
            })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Create a standard health router.
///
/// - `/health` - Liveness probe
/// - `/health/live` - Liveness probe with uptime
/// - `/health/ready` - Readiness probe
/// - `/stream/info` - Stream monitoring
/// - `/metrics` - Prometheus metrics
pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Create a router with DLQ admin endpoints.
///
/// - `GET /admin/dlq/stats` - DLQ statistics
/// - `GET /admin/dlq/messages` - List DLQ entries
/// - `GET /admin/dlq/analyze` - Failure pattern analysis
/// - `POST /admin/dlq/reprocess/{queue}/{id}` - Reprocess single entry
/// - `POST /admin/dlq/bulk-reprocess` - Reprocess batch
/// - `DELETE /admin/dlq/purge` - Purge by age
/// - `DELETE /admin/dlq/{id}` - Delete single entry
pub fn dlq_admin_router(state: HealthState) -> axum::Router {
    use axum::routing::{delete, get, post};

    axum::Router::new()
        .route("/admin/dlq/stats", get(dlq_stats_handler))
        .route("/admin/dlq/messages", get(dlq_list_handler))
        .route("/admin/dlq/analyze", get(dlq_analyze_handler))
        .route(
            "/admin/dlq/reprocess/{queue}/{id}",
            post(dlq_reprocess_handler),
        )
        .route("/admin/dlq/bulk-reprocess", post(dlq_bulk_reprocess_handler))
        .route("/admin/dlq/purge", delete(dlq_purge_handler))
        .route("/admin/dlq/{id}", delete(dlq_delete_handler))
        .with_state(state)
}

/// Create a full router with health and DLQ admin endpoints.
pub fn full_admin_router(state: HealthState) -> axum::Router {
    health_router(state.clone()).merge(dlq_admin_router(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            name: "message-worker".to_string(),
            version: "0.1.0".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"name\":\"message-worker\""));
    }

    #[test]
    fn test_default_params() {
        assert_eq!(default_limit(), 25);
        assert!(default_true());
        assert_eq!(default_purge_days(), 7);
        assert_eq!(default_analyze_hours(), 24);
    }
}
