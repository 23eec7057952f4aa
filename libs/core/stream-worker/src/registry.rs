//! Core traits for stream processing
//!
//! This module defines the core abstractions:
//! - `StreamJob`: an entry payload that can flow through a stream
//! - `StreamDef`: stream configuration (type-safe constants)
//! - `StreamProcessor`: entry processor trait
//! - `Delivery`: one delivered entry with its stream ID

use crate::StreamError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A job that can be carried by a Redis stream entry.
///
/// Implement this trait for your payload types to make them processable by
/// the `StreamWorker`. The retry count travels inside the payload so a
/// republished entry remembers how many attempts it has consumed.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Get the unique job ID (used for logging and as the `id_hint` when
    /// per-key ordering is wanted).
    fn job_id(&self) -> String;

    /// Get the current retry count
    fn retry_count(&self) -> u32;

    /// Create a new instance with incremented retry count
    fn with_retry(&self) -> Self;

    /// Get the maximum number of retries (default: 3)
    fn max_retries(&self) -> u32 {
        3
    }

    /// Check if the job can be retried
    fn can_retry(&self) -> bool {
        self.retry_count() < self.max_retries()
    }

    /// Scheduling priority stored on the envelope (lower = more urgent).
    fn priority(&self) -> u8 {
        1
    }

    /// Originating service recorded on the envelope.
    fn source(&self) -> &str {
        "unknown"
    }

    /// Message kind recorded on DLQ entries for failure analysis.
    fn message_kind(&self) -> String {
        "unknown".to_string()
    }
}

/// Stream configuration (type-safe constants)
///
/// Implement this trait to define your stream's Redis keys and settings.
///
/// # Example
///
/// ```ignore
/// struct MessageStream;
///
/// impl StreamDef for MessageStream {
///     const STREAM_NAME: &'static str = "messages:stream";
///     const CONSUMER_GROUP: &'static str = "processors";
///     const DLQ_STREAM: &'static str = "messages:stream:dlq";
/// }
/// ```
pub trait StreamDef {
    /// The Redis stream name (e.g., "messages:stream")
    const STREAM_NAME: &'static str;

    /// The consumer group name (e.g., "processors")
    const CONSUMER_GROUP: &'static str;

    /// The dead letter queue stream name (e.g., "messages:stream:dlq")
    const DLQ_STREAM: &'static str;

    /// Maximum stream length before approximate trimming (default: 10,000)
    const MAX_LENGTH: i64 = 10_000;

    /// Default batch size for reading entries (default: 10)
    const BATCH_SIZE: usize = 10;

    /// Blocking read timeout in milliseconds (default: 1000)
    const BLOCK_MS: u64 = 1_000;

    /// Idle time before an abandoned entry may be claimed (default: 5 min)
    const AUTO_CLAIM_IDLE_MS: u64 = 300_000;
}

/// One delivered stream entry.
#[derive(Debug, Clone)]
pub struct Delivery<J> {
    /// Stream ID assigned at publish time (monotonic per partition).
    pub stream_id: String,
    /// The decoded payload.
    pub job: J,
    /// Whether this entry was claimed from another consumer.
    pub claimed: bool,
}

impl<J> Delivery<J> {
    pub fn new(stream_id: impl Into<String>, job: J) -> Self {
        Self {
            stream_id: stream_id.into(),
            job,
            claimed: false,
        }
    }

    pub fn claimed(stream_id: impl Into<String>, job: J) -> Self {
        Self {
            stream_id: stream_id.into(),
            job,
            claimed: true,
        }
    }
}

/// Entry processor trait
///
/// Implement this trait to define how entries are processed.
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Process one delivered entry.
    ///
    /// Return `Ok(())` on success, or a `StreamError` on failure. The
    /// error's retryability and category drive retry/DLQ behavior.
    async fn process(&self, delivery: &Delivery<J>) -> Result<(), StreamError>;

    /// Get the processor name (for logging and metrics)
    fn name(&self) -> &'static str;

    /// Perform a health check
    ///
    /// Override to check downstream service availability.
    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct TestJob {
        id: String,
        retry_count: u32,
    }

    impl StreamJob for TestJob {
        fn job_id(&self) -> String {
            self.id.clone()
        }

        fn retry_count(&self) -> u32 {
            self.retry_count
        }

        fn with_retry(&self) -> Self {
            Self {
                id: self.id.clone(),
                retry_count: self.retry_count + 1,
            }
        }
    }

    struct TestStream;

    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:stream:dlq";
    }

    #[test]
    fn test_stream_job_defaults() {
        let job = TestJob {
            id: "job-1".to_string(),
            retry_count: 0,
        };

        assert_eq!(job.job_id(), "job-1");
        assert_eq!(job.retry_count(), 0);
        assert_eq!(job.max_retries(), 3);
        assert!(job.can_retry());
        assert_eq!(job.priority(), 1);
        assert_eq!(job.source(), "unknown");

        let retried = job.with_retry();
        assert_eq!(retried.retry_count(), 1);
    }

    #[test]
    fn test_stream_def_defaults() {
        assert_eq!(TestStream::STREAM_NAME, "test:stream");
        assert_eq!(TestStream::CONSUMER_GROUP, "test_workers");
        assert_eq!(TestStream::DLQ_STREAM, "test:stream:dlq");
        assert_eq!(TestStream::MAX_LENGTH, 10_000);
        assert_eq!(TestStream::AUTO_CLAIM_IDLE_MS, 300_000);
    }

    #[test]
    fn test_delivery_constructors() {
        let job = TestJob {
            id: "j".into(),
            retry_count: 0,
        };
        let fresh = Delivery::new("1-0", job.clone());
        assert!(!fresh.claimed);

        let claimed = Delivery::claimed("1-1", job);
        assert!(claimed.claimed);
    }
}
