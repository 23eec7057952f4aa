//! Observability utilities for the message-processing fabric.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Custom metrics for webhook ingestion and message processing
//! - Axum middleware for automatic request metrics
//! - Correlation-ID propagation for request tracing
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, MessagingMetrics};
//!
//! // Initialize metrics recorder
//! init_metrics();
//!
//! // Record ingestion outcomes
//! MessagingMetrics::record_duplicate("inst-1");
//! MessagingMetrics::record_webhook_event("inst-1", "message", "accepted");
//!
//! // Add metrics endpoint to router
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod correlation;
pub mod messaging;
pub mod middleware;

pub use correlation::{correlation_middleware, CorrelationId, CORRELATION_HEADER};
pub use messaging::MessagingMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup.
/// Returns the PrometheusHandle for rendering metrics.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        info!("Prometheus metrics recorder initialized");

        register_metric_descriptions();

        handle
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // HTTP metrics
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    // Ingestion metrics
    describe_counter!(
        "webhook_events_total",
        "Webhook events by instance, event type and outcome"
    );
    describe_counter!(
        "messages_duplicate_total",
        "Inbound messages suppressed as duplicates"
    );
    describe_counter!(
        "messages_out_of_order_total",
        "Inbound messages rejected as out of order"
    );
    describe_counter!(
        "conversation_lock_failures_total",
        "Conversation lock acquisitions that failed"
    );

    // Processing metrics
    describe_counter!(
        "messages_processed_total",
        "Messages processed by status and kind"
    );
    describe_histogram!(
        "message_processing_duration_seconds",
        "End-to-end processing duration per message"
    );
    describe_counter!("replies_sent_total", "Replies delivered to the gateway");

    // Resilience metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half-open)"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Failures recorded by circuit breakers"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Successes recorded by circuit breakers"
    );

    // Admission metrics
    describe_gauge!("queue_depth", "Stream depth by stream name");
    describe_counter!(
        "requests_rejected_total",
        "Requests rejected by the admission layer, by reason"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_uninitialized_is_safe() {
        // The recorder may or may not be installed depending on test order;
        // the handler must never panic either way.
        let body = metrics_handler().await;
        assert!(body.starts_with('#') || body.contains("_total") || body.is_empty());
    }
}
