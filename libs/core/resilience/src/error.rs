//! Error taxonomy for outbound calls.
//!
//! Call sites return a `CallError` carrying an explicit kind instead of
//! re-raising opaque exceptions; retry loops and circuit breakers consume
//! `retryable()` rather than matching on message strings.

use thiserror::Error;

/// Classification of a failed outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; never retried.
    Validation,
    /// Authentication or authorization failure; never retried.
    Auth,
    /// Target resource does not exist; never retried.
    NotFound,
    /// Deadline elapsed; retryable.
    Timeout,
    /// Transport-level failure; retryable.
    Connection,
    /// Remote asked us to back off; retryable after the hinted delay.
    RateLimited,
    /// A circuit breaker is open; retryable once it recovers.
    CircuitOpen,
    /// Remote returned a server error; retryable up to the cap.
    ExternalService,
    /// Domain rule rejected the operation; never retried.
    BusinessRule,
    /// Unexpected local failure; retryable once.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::ExternalService => "external_service",
            Self::BusinessRule => "business_rule",
            Self::Internal => "internal",
        }
    }
}

/// An error from an outbound call, carrying its classification.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided backoff hint in seconds (429 responses).
    pub retry_after_secs: Option<u64>,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after_secs,
        }
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircuitOpen, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Map an HTTP status code to a call error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => Self::validation(message),
            401 | 403 => Self::auth(message),
            404 => Self::not_found(message),
            408 | 504 => Self::timeout(message),
            429 => Self::rate_limited(message, None),
            500..=599 => Self::external(message),
            _ => Self::internal(message),
        }
    }
}

/// Errors that can report whether a retry is worthwhile.
pub trait Retryable {
    fn retryable(&self) -> bool;
}

impl Retryable for CallError {
    fn retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout
                | ErrorKind::Connection
                | ErrorKind::RateLimited
                | ErrorKind::CircuitOpen
                | ErrorKind::ExternalService
                | ErrorKind::Internal
        )
    }
}
