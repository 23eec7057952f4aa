//! Domain metrics for webhook ingestion and message processing.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Static helpers for recording messaging-fabric metrics.
pub struct MessagingMetrics;

impl MessagingMetrics {
    /// Record a webhook event outcome (received, accepted, skipped, error, ...).
    pub fn record_webhook_event(instance_id: &str, event_type: &str, outcome: &str) {
        counter!(
            "webhook_events_total",
            "instance" => instance_id.to_string(),
            "event" => event_type.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    /// Record a suppressed duplicate message.
    pub fn record_duplicate(instance_id: &str) {
        counter!(
            "messages_duplicate_total",
            "instance" => instance_id.to_string()
        )
        .increment(1);
    }

    /// Record an out-of-order rejection.
    pub fn record_out_of_order(instance_id: &str) {
        counter!(
            "messages_out_of_order_total",
            "instance" => instance_id.to_string()
        )
        .increment(1);
    }

    /// Record a failed conversation lock acquisition.
    pub fn record_lock_failure(message_kind: &str) {
        counter!(
            "conversation_lock_failures_total",
            "kind" => message_kind.to_string()
        )
        .increment(1);
    }

    /// Record a processed message by terminal status.
    pub fn record_processed(status: &str, message_kind: &str) {
        counter!(
            "messages_processed_total",
            "status" => status.to_string(),
            "kind" => message_kind.to_string()
        )
        .increment(1);
    }

    /// Record end-to-end processing duration.
    pub fn record_processing_duration(workflow: &str, duration: Duration) {
        histogram!(
            "message_processing_duration_seconds",
            "workflow" => workflow.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a reply delivered to the gateway.
    pub fn record_reply_sent(instance_id: &str) {
        counter!(
            "replies_sent_total",
            "instance" => instance_id.to_string()
        )
        .increment(1);
    }

    /// Update the depth gauge for a stream.
    pub fn set_queue_depth(stream: &str, depth: f64) {
        gauge!(
            "queue_depth",
            "stream" => stream.to_string()
        )
        .set(depth);
    }

    /// Record a request rejected by the admission layer.
    pub fn record_rejected(reason: &str) {
        counter!(
            "requests_rejected_total",
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}
