//! Adaptive throttle: an advisory delay proportional to queue depth.

use crate::{is_protected_path, AdmissionState};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Duration;

/// Advisory delay for the current depth:
/// `min(max_delay, base_delay + 100 * max(0, depth/100 - 1))` milliseconds.
pub fn adaptive_delay_ms(depth: u64, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let surplus_hundreds = (depth / 100).saturating_sub(1);
    let delay = base_delay_ms + 100 * surplus_hundreds;
    delay.min(max_delay_ms)
}

/// Adaptive throttle middleware.
///
/// Delays the request before handing it to the business handler; the applied
/// delay is reported in `X-Throttle-Delay-Ms`.
pub async fn throttle_middleware(
    State(state): State<AdmissionState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if is_protected_path(request.uri().path()) {
        return next.run(request).await;
    }

    let snapshot = state.monitor.snapshot().await;
    let delay_ms = adaptive_delay_ms(
        snapshot.stream_length,
        state.config.base_throttle_delay_ms,
        state.config.max_throttle_delay_ms,
    );

    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let mut response = next.run(request).await;

    if delay_ms > 0 {
        if let Ok(value) = HeaderValue::from_str(&delay_ms.to_string()) {
            response.headers_mut().insert("X-Throttle-Delay-Ms", value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_below_depth_200() {
        assert_eq!(adaptive_delay_ms(0, 0, 1000), 0);
        assert_eq!(adaptive_delay_ms(99, 0, 1000), 0);
        assert_eq!(adaptive_delay_ms(199, 0, 1000), 0);
    }

    #[test]
    fn test_delay_grows_with_depth() {
        assert_eq!(adaptive_delay_ms(200, 0, 1000), 100);
        assert_eq!(adaptive_delay_ms(300, 0, 1000), 200);
        assert_eq!(adaptive_delay_ms(1000, 0, 1000), 900);
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(adaptive_delay_ms(100_000, 0, 1000), 1000);
        assert_eq!(adaptive_delay_ms(100_000, 50, 500), 500);
    }

    #[test]
    fn test_base_delay_always_applies() {
        assert_eq!(adaptive_delay_ms(0, 25, 1000), 25);
        assert_eq!(adaptive_delay_ms(250, 25, 1000), 125);
    }
}
