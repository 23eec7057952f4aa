//! Circuit breaker keyed by (caller service, callee function).

use crate::error::CallError;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected immediately.
    Open,
    /// Circuit is half-open, testing if the service has recovered.
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the state gauge (0=closed, 1=open, 2=half-open).
    pub fn as_gauge_value(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to wait in open state before transitioning to half-open.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

/// Thread-safe circuit breaker for one (service, function) pair.
pub struct CircuitBreaker {
    service: String,
    function: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    last_failure_time: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given call site.
    pub fn new(
        service: impl Into<String>,
        function: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        let breaker = Self {
            service: service.into(),
            function: function.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure_time: RwLock::new(None),
        };
        breaker.publish_state(CircuitState::Closed);
        breaker
    }

    /// Get the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }

    /// Get the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Check whether a call may proceed.
    ///
    /// Returns `Err(CallError::circuit_open)` while the circuit is open and
    /// the recovery timeout has not elapsed. When the timeout has elapsed,
    /// the breaker transitions to half-open and lets one probe through.
    pub fn check(&self) -> Result<(), CallError> {
        let current_state = *self.state.read().unwrap();

        match current_state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                if self.should_attempt_reset() {
                    self.transition_to(CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(CallError::circuit_open(format!(
                        "circuit open for {}:{}",
                        self.service, self.function
                    )))
                }
            }
        }
    }

    /// Record a successful operation.
    ///
    /// A single success in half-open state closes the circuit and resets the
    /// failure counter.
    pub fn record_success(&self) {
        counter!(
            "circuit_breaker_successes_total",
            "service" => self.service.clone(),
            "function" => self.function.clone()
        )
        .increment(1);

        let current_state = *self.state.read().unwrap();

        match current_state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                self.failure_count.store(0, Ordering::SeqCst);
                self.transition_to(CircuitState::Closed);
            }
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        counter!(
            "circuit_breaker_failures_total",
            "service" => self.service.clone(),
            "function" => self.function.clone()
        )
        .increment(1);

        *self.last_failure_time.write().unwrap() = Some(Instant::now());

        let current_state = *self.state.read().unwrap();

        match current_state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state reopens the circuit
                self.transition_to(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        self.transition_to(CircuitState::Closed);
    }

    fn should_attempt_reset(&self) -> bool {
        let last_failure = self.last_failure_time.read().unwrap();
        match *last_failure {
            Some(time) => time.elapsed() >= self.config.recovery_timeout,
            None => true,
        }
    }

    fn transition_to(&self, new_state: CircuitState) {
        let mut state = self.state.write().unwrap();
        if *state == new_state {
            return;
        }
        let old_state = *state;
        *state = new_state;
        drop(state);

        self.publish_state(new_state);

        match new_state {
            CircuitState::Open => tracing::warn!(
                service = %self.service,
                function = %self.function,
                ?old_state,
                "Circuit breaker OPENED"
            ),
            CircuitState::HalfOpen => tracing::info!(
                service = %self.service,
                function = %self.function,
                "Circuit breaker HALF-OPEN (testing recovery)"
            ),
            CircuitState::Closed => tracing::info!(
                service = %self.service,
                function = %self.function,
                "Circuit breaker CLOSED (recovered)"
            ),
        }
    }

    fn publish_state(&self, state: CircuitState) {
        gauge!(
            "circuit_breaker_state",
            "service" => self.service.clone(),
            "function" => self.function.clone()
        )
        .set(state.as_gauge_value());
    }
}

/// Registry of circuit breakers keyed by (service, function).
///
/// Breakers are created on first use with the registry's default
/// configuration and shared between callers of the same call site.
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<(String, String), Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get (or lazily create) the breaker for a call site.
    pub fn breaker(&self, service: &str, function: &str) -> Arc<CircuitBreaker> {
        let key = (service.to_string(), function.to_string());

        if let Some(breaker) = self.breakers.read().unwrap().get(&key) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().unwrap();
        Arc::clone(breakers.entry(key).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(service, function, self.config.clone()))
        }))
    }

    /// Number of breakers currently registered.
    pub fn len(&self) -> usize {
        self.breakers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().unwrap().is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            "call",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
            },
        )
    }

    #[test]
    fn test_initial_state_is_closed() {
        let breaker = test_breaker(3, Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn test_opens_on_consecutive_failures() {
        let breaker = test_breaker(3, Duration::from_secs(30));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.check().is_err());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = test_breaker(3, Duration::from_secs(30));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);

        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_closes_on_single_success() {
        let breaker = test_breaker(1, Duration::from_millis(1));

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(10));
        assert!(breaker.check().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let breaker = test_breaker(1, Duration::from_millis(1));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        breaker.check().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_rejects_with_circuit_open() {
        let breaker = test_breaker(1, Duration::from_secs(60));
        breaker.record_failure();

        let err = breaker.check().unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::CircuitOpen);
        assert!(err.to_string().contains("test:call"));
    }

    #[test]
    fn test_gauge_encoding() {
        assert_eq!(CircuitState::Closed.as_gauge_value(), 0.0);
        assert_eq!(CircuitState::Open.as_gauge_value(), 1.0);
        assert_eq!(CircuitState::HalfOpen.as_gauge_value(), 2.0);
    }

    #[test]
    fn test_registry_shares_breakers_per_call_site() {
        let registry = BreakerRegistry::default();
        let a = registry.breaker("svc", "f1");
        let b = registry.breaker("svc", "f1");
        let c = registry.breaker("svc", "f2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }
}
