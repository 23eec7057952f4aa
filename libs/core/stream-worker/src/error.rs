//! Error types for stream operations.
//!
//! This module provides:
//! - `StreamError` - The main error type for stream operations
//! - `DlqCategory` - Classification recorded on dead-letter entries
//!
//! Retryability is structural (by variant); only the DLQ categorization of
//! opaque processing text falls back to keyword matching.

use resilience::{CallError, ErrorKind, Retryable};
use thiserror::Error;

/// Errors that can occur during stream operations.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Append to the stream failed; the caller decides what to do.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Entry processing error carrying the downstream call classification.
    #[error("Processing error: {0}")]
    Call(#[from] CallError),

    /// Entry processing error with only opaque text available.
    #[error("Processing error: {0}")]
    Processing(String),

    /// Execution was cancelled by a deadline; never retried.
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Consumer group error.
    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    /// Entry payload could not be parsed.
    #[error("Entry parsing error: {0}")]
    EntryParsing(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Check if this is a BLOCK timeout (normal behavior, not an error).
    ///
    /// When using XREADGROUP with BLOCK, a timeout means no entries arrived
    /// within the block period.
    pub fn is_block_timeout(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                err_str.contains("timed out") && !err_str.contains("connection")
            }
            _ => false,
        }
    }

    /// Check if this is a connection-level error worth a reconnect.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Redis(e) => {
                if self.is_block_timeout() {
                    return false;
                }
                let err_str = e.to_string().to_lowercase();
                err_str.contains("connection")
                    || err_str.contains("disconnected")
                    || err_str.contains("broken pipe")
                    || err_str.contains("reset by peer")
                    || err_str.contains("refused")
                    || err_str.contains("eof")
                    || err_str.contains("io error")
            }
            Self::Call(e) => e.kind == ErrorKind::Connection,
            _ => false,
        }
    }

    /// Check if this is a consumer group missing error (NOGROUP).
    pub fn is_nogroup_error(&self) -> bool {
        match self {
            Self::Redis(e) => e.to_string().contains("NOGROUP"),
            Self::ConsumerGroup(s) => s.contains("NOGROUP"),
            _ => false,
        }
    }

    /// DLQ category recorded when this error dead-letters an entry.
    pub fn dlq_category(&self) -> DlqCategory {
        match self {
            Self::Call(e) => match e.kind {
                ErrorKind::Timeout => DlqCategory::Timeout,
                ErrorKind::Connection => DlqCategory::Connection,
                ErrorKind::RateLimited => DlqCategory::RateLimit,
                ErrorKind::Auth => DlqCategory::Auth,
                ErrorKind::Validation | ErrorKind::BusinessRule => DlqCategory::Validation,
                _ => DlqCategory::Other,
            },
            Self::Timeout(_) => DlqCategory::Timeout,
            Self::Redis(_) => {
                if self.is_connection_error() {
                    DlqCategory::Connection
                } else {
                    DlqCategory::Other
                }
            }
            Self::Serialization(_) | Self::EntryParsing(_) => DlqCategory::Validation,
            Self::Processing(s) => DlqCategory::from_text(s),
            _ => DlqCategory::Other,
        }
    }
}

impl Retryable for StreamError {
    fn retryable(&self) -> bool {
        match self {
            Self::Call(e) => e.retryable(),
            // Deadline-cancelled executions surface as cancelled, never retried
            Self::Cancelled(_) => false,
            // Malformed payloads will not get better on retry
            Self::Serialization(_) | Self::EntryParsing(_) | Self::Config(_) => false,
            Self::Processing(s) => !matches!(
                DlqCategory::from_text(s),
                DlqCategory::Auth | DlqCategory::Validation
            ),
            // Transport, timeout, group and internal errors are worth a retry
            _ => true,
        }
    }
}

/// Category recorded on dead-letter entries, indexed for failure analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqCategory {
    Timeout,
    Connection,
    RateLimit,
    Auth,
    Validation,
    Other,
}

impl DlqCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Other => "other",
        }
    }

    /// Categorize opaque error text by keywords.
    ///
    /// Only used for text that lost its structure (DLQ entries store the
    /// error as a string); live errors are classified by variant.
    pub fn from_text(error: &str) -> Self {
        let lower = error.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("connection") {
            Self::Connection
        } else if lower.contains("rate") || lower.contains("limit") {
            Self::RateLimit
        } else if lower.contains("auth") || lower.contains("permission") {
            Self::Auth
        } else if lower.contains("validation") || lower.contains("invalid") {
            Self::Validation
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for DlqCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DlqCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(Self::Timeout),
            "connection" => Ok(Self::Connection),
            "rate_limit" => Ok(Self::RateLimit),
            "auth" => Ok(Self::Auth),
            "validation" => Ok(Self::Validation),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown DLQ category: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::Processing("failed to reach agent".to_string());
        assert_eq!(err.to_string(), "Processing error: failed to reach agent");
    }

    #[test]
    fn test_category_from_text() {
        assert_eq!(DlqCategory::from_text("request timeout"), DlqCategory::Timeout);
        assert_eq!(
            DlqCategory::from_text("Connection refused"),
            DlqCategory::Connection
        );
        assert_eq!(
            DlqCategory::from_text("rate limit exceeded"),
            DlqCategory::RateLimit
        );
        assert_eq!(
            DlqCategory::from_text("permission denied"),
            DlqCategory::Auth
        );
        assert_eq!(
            DlqCategory::from_text("invalid payload shape"),
            DlqCategory::Validation
        );
        assert_eq!(DlqCategory::from_text("boom"), DlqCategory::Other);
    }

    #[test]
    fn test_call_error_category_is_structural() {
        let err = StreamError::Call(resilience::CallError::timeout("deadline"));
        assert_eq!(err.dlq_category(), DlqCategory::Timeout);

        let err = StreamError::Call(resilience::CallError::auth("nope"));
        assert_eq!(err.dlq_category(), DlqCategory::Auth);
        assert!(!err.retryable());
    }

    #[test]
    fn test_retryability() {
        assert!(StreamError::Timeout("t".into()).retryable());
        assert!(StreamError::Processing("503 from agent".into()).retryable());
        assert!(!StreamError::Cancelled("deadline".into()).retryable());
        assert!(!StreamError::EntryParsing("bad json".into()).retryable());
        assert!(!StreamError::Processing("validation failed".into()).retryable());
    }

    #[test]
    fn test_category_roundtrip() {
        for cat in [
            DlqCategory::Timeout,
            DlqCategory::Connection,
            DlqCategory::RateLimit,
            DlqCategory::Auth,
            DlqCategory::Validation,
            DlqCategory::Other,
        ] {
            let parsed: DlqCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, cat);
        }
        assert!("bogus".parse::<DlqCategory>().is_err());
    }
}
