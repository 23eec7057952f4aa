//! Redis stream producer.
//!
//! Entries are appended with an envelope of flat fields:
//! `{data, timestamp, retry_count, priority, source}` where `data` is the
//! JSON-encoded job. Supplying an `id_hint` forces the entry's stream ID,
//! which is how per-conversation FIFO ordering is obtained (the webhook
//! handler publishes with the gateway message ID as the hint).

use crate::error::StreamError;
use crate::registry::{StreamDef, StreamJob};
use chrono::Utc;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::debug;

/// Redis stream producer for appending entries.
///
/// Used by the ingress API to enqueue inbound messages for background
/// processing, and by the worker to republish retries.
pub struct StreamProducer {
    redis: Arc<ConnectionManager>,
    stream_name: String,
    max_length: Option<i64>,
}

impl StreamProducer {
    /// Create a new producer for the given stream.
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis: Arc::new(redis),
            stream_name: stream_name.into(),
            max_length: None,
        }
    }

    /// Create a producer from a `StreamDef` implementation.
    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis: Arc::new(redis),
            stream_name: S::STREAM_NAME.to_string(),
            max_length: Some(S::MAX_LENGTH),
        }
    }

    /// Set the maximum stream length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Get the stream name.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Append a job to the stream with an auto-assigned ID.
    pub async fn publish<J: StreamJob>(&self, job: &J) -> Result<String, StreamError> {
        self.publish_with_id(job, None).await
    }

    /// Append a job, optionally forcing the stream ID.
    ///
    /// `id_hint = Some(...)` passes the hint verbatim as the XADD ID; Redis
    /// rejects hints that do not sort after the last entry, which surfaces
    /// as `PublishFailed` for the caller to handle.
    pub async fn publish_with_id<J: StreamJob>(
        &self,
        job: &J,
        id_hint: Option<&str>,
    ) -> Result<String, StreamError> {
        let data = serde_json::to_string(job)?;
        self.append_envelope(
            &data,
            job.retry_count(),
            job.priority(),
            job.source(),
            id_hint,
        )
        .await
    }

    /// Append a pre-serialized payload (used by DLQ reprocessing).
    pub async fn publish_raw(
        &self,
        data: &str,
        retry_count: u32,
        priority: u8,
        source: &str,
    ) -> Result<String, StreamError> {
        self.append_envelope(data, retry_count, priority, source, None)
            .await
    }

    async fn append_envelope(
        &self,
        data: &str,
        retry_count: u32,
        priority: u8,
        source: &str,
        id_hint: Option<&str>,
    ) -> Result<String, StreamError> {
        let mut conn = (*self.redis).clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_name);

        if let Some(max_len) = self.max_length {
            // MAXLEN ~ for approximate trimming (cheaper than exact)
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }

        cmd.arg(id_hint.unwrap_or("*"))
            .arg("data")
            .arg(data)
            .arg("timestamp")
            .arg(Utc::now().to_rfc3339())
            .arg("retry_count")
            .arg(retry_count.to_string())
            .arg("priority")
            .arg(priority.to_string())
            .arg("source")
            .arg(source);

        let stream_id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StreamError::PublishFailed(e.to_string()))?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            retry_count = %retry_count,
            priority = %priority,
            "Appended entry to stream"
        );

        Ok(stream_id)
    }

    /// Get the current length of the stream.
    pub async fn length(&self) -> Result<u64, StreamError> {
        let mut conn = (*self.redis).clone();

        let length: u64 = redis::cmd("XLEN")
            .arg(&self.stream_name)
            .query_async(&mut conn)
            .await?;

        Ok(length)
    }

    /// Trim the stream to approximately `maxlen` entries.
    pub async fn trim(&self, maxlen: i64) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: () = redis::cmd("XTRIM")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(maxlen)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

impl Clone for StreamProducer {
    fn clone(&self) -> Self {
        Self {
            redis: Arc::clone(&self.redis),
            stream_name: self.stream_name.clone(),
            max_length: self.max_length,
        }
    }
}
