//! Admission layer for the ingress HTTP surface.
//!
//! Three cooperating gates, applied as middleware in this order:
//!
//! 1. **Backpressure**: samples stream depth, pending entries and DLQ size;
//!    rejects requests with 503 while the system is critically loaded and
//!    shrinks per-request timeouts as load grows.
//! 2. **Rate limiter**: per-client sliding window over a Redis sorted set;
//!    429 with a Retry-After derived from the oldest entry in the window.
//! 3. **Adaptive throttle**: advisory delay proportional to queue depth.
//!
//! Observability paths (`/health`, `/metrics`, `/admin/dlq`) bypass all
//! three gates so operators can always see a struggling system.

mod backpressure;
mod load;
mod rate_limit;
mod throttle;

pub use backpressure::{backpressure_middleware, timeout_for_level};
pub use load::{LoadLevel, LoadMonitor, LoadSnapshot};
pub use rate_limit::{client_id_from_request, rate_limit_middleware, RateDecision, SlidingWindowLimiter};
pub use throttle::{adaptive_delay_ms, throttle_middleware};

use core_config::admission::AdmissionConfig;
use std::sync::Arc;

/// Paths that bypass the admission gates.
pub const PROTECTED_PATHS: &[&str] = &["/health", "/metrics", "/admin/dlq"];

/// Whether a request path is exempt from admission control.
pub fn is_protected_path(path: &str) -> bool {
    PROTECTED_PATHS.iter().any(|p| path.starts_with(p))
}

/// Shared state for the admission middleware stack.
#[derive(Clone)]
pub struct AdmissionState {
    pub monitor: Arc<LoadMonitor>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub config: AdmissionConfig,
}

impl AdmissionState {
    pub fn new(
        redis: redis::aio::ConnectionManager,
        stream_name: impl Into<String>,
        consumer_group: impl Into<String>,
        config: AdmissionConfig,
    ) -> Self {
        let monitor = Arc::new(LoadMonitor::new(
            redis.clone(),
            stream_name,
            consumer_group,
            config.clone(),
        ));
        let limiter = Arc::new(SlidingWindowLimiter::new(
            redis,
            config.requests_per_minute,
            config.window_seconds,
        ));
        Self {
            monitor,
            limiter,
            config,
        }
    }
}
