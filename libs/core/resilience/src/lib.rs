//! Resilience primitives shared by every outbound call.
//!
//! This crate provides:
//! - **Circuit Breaker**: per-(service, function) breakers that fail fast
//!   while a downstream dependency is broken
//! - **Retry with backoff**: bounded exponential backoff with uniform jitter,
//!   driven by the error's own retryability
//! - **CallError**: the explicit error taxonomy consumed by both
//!
//! ## Circuit Breaker States
//!
//! ```text
//! ┌─────────┐  failures >= threshold  ┌────────┐
//! │ CLOSED  │ ──────────────────────> │  OPEN  │
//! └─────────┘                         └────────┘
//!      ^                                   │
//!      │                                   │ recovery timeout elapsed
//!      │                                   v
//!      │      success            ┌─────────────┐
//!      └──────────────────────── │ HALF-OPEN   │
//!                                └─────────────┘
//!                                      │
//!                       failure        │
//!                       ───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use resilience::{BreakerRegistry, RetryPolicy, retry_with_policy};
//!
//! let registry = BreakerRegistry::default();
//! let breaker = registry.breaker("orchestrator", "rag.query");
//!
//! breaker.check()?;
//! let result = retry_with_policy(&RetryPolicy::default(), "corr-1", || async {
//!     call_agent().await
//! })
//! .await;
//! match &result {
//!     Ok(_) => breaker.record_success(),
//!     Err(_) => breaker.record_failure(),
//! }
//! ```

mod breaker;
mod error;
mod retry;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{CallError, ErrorKind, Retryable};
pub use retry::{retry_with_policy, RetryPolicy};
