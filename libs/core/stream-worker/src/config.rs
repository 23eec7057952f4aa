//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the stream worker.

use crate::registry::StreamDef;
use uuid::Uuid;

/// Configuration for the stream worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis stream name
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Dead letter queue stream name
    pub dlq_stream: String,

    /// Maximum stream length before approximate trimming
    pub max_length: i64,

    /// Batch size for reading entries
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds
    pub block_ms: u64,

    /// Idle time before abandoned entries are claimed (0 disables auto-claim)
    pub auto_claim_idle_ms: u64,

    /// Maximum retries before an entry moves to the DLQ
    pub max_retries: u32,

    /// Upper bound for the retry backoff sleep, in seconds
    pub max_retry_sleep_secs: u64,

    /// Enable dead letter queue handling
    pub enable_dlq: bool,
}

impl WorkerConfig {
    /// Create a new WorkerConfig from a StreamDef
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            stream_name: S::STREAM_NAME.to_string(),
            consumer_group: S::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: S::DLQ_STREAM.to_string(),
            max_length: S::MAX_LENGTH,
            batch_size: S::BATCH_SIZE,
            block_ms: S::BLOCK_MS,
            auto_claim_idle_ms: S::AUTO_CLAIM_IDLE_MS,
            max_retries: 3,
            max_retry_sleep_secs: 60,
            enable_dlq: true,
        }
    }

    /// Create a new WorkerConfig with explicit values
    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let stream_name = stream_name.into();
        let dlq_stream = format!("{}:dlq", stream_name);
        Self {
            stream_name,
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream,
            max_length: 10_000,
            batch_size: 10,
            block_ms: 1_000,
            auto_claim_idle_ms: 300_000,
            max_retries: 3,
            max_retry_sleep_secs: 60,
            enable_dlq: true,
        }
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the DLQ stream name
    pub fn with_dlq_stream(mut self, stream: impl Into<String>) -> Self {
        self.dlq_stream = stream.into();
        self
    }

    /// Set the maximum stream length
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the blocking read timeout
    pub fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    /// Set the auto-claim idle threshold (0 disables auto-claim)
    pub fn with_auto_claim_idle_ms(mut self, idle_ms: u64) -> Self {
        self.auto_claim_idle_ms = idle_ms;
        self
    }

    /// Set the maximum retries before DLQ
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable the DLQ
    pub fn with_dlq(mut self, enable: bool) -> Self {
        self.enable_dlq = enable;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("messages:stream", "processors")
    }
}
