//! Metrics module for stream worker observability.
//!
//! This module provides Prometheus-compatible metrics for monitoring
//! stream worker performance and health.
//!
//! ## Available Metrics
//!
//! - `stream_jobs_processed_total` - Counter of entries processed by status
//! - `stream_job_processing_duration_seconds` - Histogram of processing time
//! - `stream_job_queue_depth` - Gauge of current queue depth
//! - `stream_errors_total` - Counter of errors by category
//! - `stream_retries_total` - Counter of retry attempts
//! - `stream_batch_size` - Histogram of consumed batch sizes
//! - `stream_dlq_size` - Gauge of DLQ depth

use crate::error::DlqCategory;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency
pub mod names {
    pub const JOBS_PROCESSED: &str = "stream_jobs_processed_total";
    pub const JOB_DURATION: &str = "stream_job_processing_duration_seconds";
    pub const QUEUE_DEPTH: &str = "stream_job_queue_depth";
    pub const ERRORS: &str = "stream_errors_total";
    pub const RETRIES: &str = "stream_retries_total";
    pub const BATCH_SIZE: &str = "stream_batch_size";
    pub const DLQ_SIZE: &str = "stream_dlq_size";
}

/// Entry processing status for metrics labeling
#[derive(Debug, Clone, Copy)]
pub enum JobStatus {
    Success,
    Failed,
    Dlq,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Dlq => "dlq",
            Self::Skipped => "skipped",
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at application startup.
/// Returns the PrometheusHandle for rendering metrics.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        })
        .clone()
}

/// Get the global Prometheus handle.
///
/// Returns None if metrics haven't been initialized.
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Record an entry as processed with the given status.
pub fn record_job_processed(stream: &str, status: JobStatus) {
    counter!(
        names::JOBS_PROCESSED,
        "stream" => stream.to_string(),
        "status" => status.as_str().to_string()
    )
    .increment(1);
}

/// Record entry processing duration.
pub fn record_job_duration(stream: &str, operation: &str, duration: Duration) {
    histogram!(
        names::JOB_DURATION,
        "stream" => stream.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Update the queue depth gauge.
pub fn set_queue_depth(stream: &str, depth: f64) {
    gauge!(
        names::QUEUE_DEPTH,
        "stream" => stream.to_string()
    )
    .set(depth);
}

/// Record an error by category.
pub fn record_error(stream: &str, category: DlqCategory) {
    counter!(
        names::ERRORS,
        "stream" => stream.to_string(),
        "category" => category.as_str().to_string()
    )
    .increment(1);
}

/// Record a retry attempt.
pub fn record_retry(stream: &str, attempt: u32) {
    counter!(
        names::RETRIES,
        "stream" => stream.to_string(),
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

/// Record the batch size processed.
pub fn record_batch_size(stream: &str, size: usize) {
    histogram!(
        names::BATCH_SIZE,
        "stream" => stream.to_string()
    )
    .record(size as f64);
}

/// Update the DLQ size gauge.
pub fn set_dlq_size(stream: &str, size: f64) {
    gauge!(
        names::DLQ_SIZE,
        "stream" => stream.to_string()
    )
    .set(size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_as_str() {
        assert_eq!(JobStatus::Success.as_str(), "success");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert_eq!(JobStatus::Dlq.as_str(), "dlq");
        assert_eq!(JobStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_recording_is_safe_without_recorder() {
        record_job_processed("test", JobStatus::Success);
        record_error("test", DlqCategory::Timeout);
        record_retry("test", 1);
        set_queue_depth("test", 1.0);
        set_dlq_size("test", 0.0);
    }
}
