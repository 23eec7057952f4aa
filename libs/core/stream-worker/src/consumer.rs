//! Redis stream consumer implementation.
//!
//! This module provides the `StreamConsumer` struct that handles:
//! - Reading entries from Redis streams via consumer groups
//! - Consumer group management
//! - Entry acknowledgment
//! - Pending-entry inspection
//! - Claiming abandoned entries (XAUTOCLAIM)

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::registry::{Delivery, StreamJob};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A delivered-but-unacked entry tracked by the consumer group.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub stream_id: String,
    pub consumer: String,
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// Stream information for monitoring.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream name.
    pub stream_name: String,
    /// Number of entries in the stream.
    pub length: usize,
    /// ID of the first entry.
    pub first_entry_id: Option<String>,
    /// ID of the last entry.
    pub last_entry_id: Option<String>,
    /// Number of consumer groups.
    pub groups: usize,
}

/// Redis stream consumer for reading and acknowledging entries.
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
}

impl StreamConsumer {
    /// Create a new stream consumer.
    pub fn new(redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self {
            redis: Arc::new(redis),
            config,
        }
    }

    /// Get a reference to the Redis connection manager.
    pub fn redis(&self) -> &ConnectionManager {
        &self.redis
    }

    /// Get the stream name.
    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    /// Ensure the consumer group exists.
    ///
    /// Creates the consumer group (and the stream, via MKSTREAM) if needed.
    /// The group starts at `0` so entries published before the first worker
    /// boot are still delivered.
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    group = %self.config.consumer_group,
                    stream = %self.config.stream_name,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(StreamError::ConsumerGroup(e.to_string())),
        }
    }

    /// Read entries previously delivered to this consumer but not yet acked.
    pub async fn read_pending_entries<J: StreamJob>(
        &self,
    ) -> Result<Vec<Delivery<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_id)
            .count(self.config.batch_size);

        // "0" reads this consumer's pending entries instead of new ones
        let result: Result<StreamReadReply, _> = conn
            .xread_options(&[&self.config.stream_name], &["0"], &opts)
            .await;

        match result {
            Ok(reply) => self.parse_entries(reply, false),
            Err(e) if e.to_string().to_lowercase().contains("timeout") => Ok(vec![]),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Read new entries from the stream, blocking up to `block_ms`.
    pub async fn read_new_entries<J: StreamJob>(&self) -> Result<Vec<Delivery<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_id)
            .count(self.config.batch_size)
            .block(self.config.block_ms as usize);

        // ">" reads only entries never delivered to this group
        let result: Result<StreamReadReply, _> = conn
            .xread_options(&[&self.config.stream_name], &[">"], &opts)
            .await;

        match result {
            Ok(reply) => {
                let entries = self.parse_entries(reply, false)?;
                if !entries.is_empty() {
                    debug!(count = entries.len(), "Received new entries");
                }
                Ok(entries)
            }
            // BLOCK timeout returns nil - normal, not an error
            Err(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("timeout")
                    || err_str.contains("timed out")
                    || err_str.contains("nil")
                    || (err_str.contains("response") && err_str.contains("type"))
                {
                    Ok(vec![])
                } else {
                    Err(StreamError::Redis(e))
                }
            }
        }
    }

    /// Parse entries from a StreamReadReply.
    fn parse_entries<J: StreamJob>(
        &self,
        reply: StreamReadReply,
        claimed: bool,
    ) -> Result<Vec<Delivery<J>>, StreamError> {
        let mut deliveries = Vec::new();

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                match Self::parse_envelope::<J>(&entry.map) {
                    Ok(job) => {
                        deliveries.push(if claimed {
                            Delivery::claimed(entry.id, job)
                        } else {
                            Delivery::new(entry.id, job)
                        });
                    }
                    Err(e) => {
                        warn!(
                            stream_id = %entry.id,
                            error = %e,
                            "Failed to parse entry payload"
                        );
                        // Unparseable entries are acked and dead-lettered by
                        // the worker via the raw path
                    }
                }
            }
        }

        Ok(deliveries)
    }

    /// Decode the `data` field of an entry envelope into a job.
    pub(crate) fn parse_envelope<J: StreamJob>(
        map: &HashMap<String, redis::Value>,
    ) -> Result<J, StreamError> {
        let data_value = map.get("data").ok_or_else(|| {
            StreamError::EntryParsing("Missing 'data' field in entry".to_string())
        })?;

        let data_str = match data_value {
            redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
            redis::Value::SimpleString(s) => s.clone(),
            _ => {
                return Err(StreamError::EntryParsing(
                    "Invalid 'data' field type".to_string(),
                ))
            }
        };

        let job: J = serde_json::from_str(&data_str)?;
        Ok(job)
    }

    /// Acknowledge an entry.
    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: () = conn
            .xack(
                &self.config.stream_name,
                &self.config.consumer_group,
                &[stream_id],
            )
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged entry");
        Ok(())
    }

    /// List pending entries for the group, optionally filtered by consumer.
    pub async fn pending(
        &self,
        consumer: Option<&str>,
        count: usize,
    ) -> Result<Vec<PendingEntry>, StreamError> {
        let mut conn = (*self.redis).clone();

        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count);
        if let Some(consumer) = consumer {
            cmd.arg(consumer);
        }

        let result: redis::Value = cmd.query_async(&mut conn).await.map_err(StreamError::Redis)?;

        let mut pending = Vec::new();
        if let redis::Value::Array(rows) = result {
            for row in rows {
                if let redis::Value::Array(fields) = row {
                    if fields.len() >= 4 {
                        let stream_id = value_to_string(&fields[0]);
                        let consumer = value_to_string(&fields[1]);
                        let idle_ms = value_to_u64(&fields[2]);
                        let delivery_count = value_to_u64(&fields[3]);
                        pending.push(PendingEntry {
                            stream_id,
                            consumer,
                            idle_ms,
                            delivery_count,
                        });
                    }
                }
            }
        }

        Ok(pending)
    }

    /// Total pending count for the consumer group (XPENDING summary form).
    pub async fn pending_count(&self) -> Result<u64, StreamError> {
        let mut conn = (*self.redis).clone();

        let result: redis::Value = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await
            .map_err(StreamError::Redis)?;

        if let redis::Value::Array(fields) = result {
            if let Some(first) = fields.first() {
                return Ok(value_to_u64(first));
            }
        }

        Ok(0)
    }

    /// Claim entries abandoned by other consumers for longer than `min_idle_ms`.
    ///
    /// XAUTOCLAIM preserves stream IDs, so per-conversation ordering survives
    /// a consumer crash.
    pub async fn auto_claim<J: StreamJob>(
        &self,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<Delivery<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let result: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .unwrap_or(redis::Value::Nil);

        // XAUTOCLAIM reply: [next-start-id, [[id, fields], ...], [deleted-ids]]
        let mut deliveries = Vec::new();
        if let redis::Value::Array(arr) = result {
            if arr.len() >= 2 {
                if let redis::Value::Array(entries) = &arr[1] {
                    for entry in entries {
                        if let redis::Value::Array(pair) = entry {
                            if pair.len() >= 2 {
                                let stream_id = value_to_string(&pair[0]);
                                let map = fields_to_map(&pair[1]);
                                match Self::parse_envelope::<J>(&map) {
                                    Ok(job) => {
                                        deliveries.push(Delivery::claimed(stream_id, job));
                                    }
                                    Err(e) => {
                                        warn!(
                                            stream_id = %stream_id,
                                            error = %e,
                                            "Failed to parse claimed entry"
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if !deliveries.is_empty() {
            info!(
                count = deliveries.len(),
                consumer = %self.config.consumer_id,
                "Claimed abandoned entries"
            );
        }

        Ok(deliveries)
    }

    /// Get the current length of the stream.
    pub async fn length(&self) -> Result<u64, StreamError> {
        let mut conn = (*self.redis).clone();
        let length: u64 = conn.xlen(&self.config.stream_name).await.unwrap_or(0);
        Ok(length)
    }

    /// Get stream information for monitoring.
    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = (*self.redis).clone();

        let result: Result<redis::streams::StreamInfoStreamReply, _> = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(&self.config.stream_name)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(info) => Ok(StreamInfo {
                stream_name: self.config.stream_name.clone(),
                length: info.length,
                first_entry_id: Some(info.first_entry.id.clone()),
                last_entry_id: Some(info.last_entry.id.clone()),
                groups: info.groups,
            }),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("no such key") || err_str.contains("ERR") {
                    // Stream doesn't exist yet
                    Ok(StreamInfo {
                        stream_name: self.config.stream_name.clone(),
                        length: 0,
                        first_entry_id: None,
                        last_entry_id: None,
                        groups: 0,
                    })
                } else {
                    Err(StreamError::Redis(e))
                }
            }
        }
    }
}

fn value_to_string(value: &redis::Value) -> String {
    match value {
        redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
        redis::Value::SimpleString(s) => s.clone(),
        redis::Value::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

fn value_to_u64(value: &redis::Value) -> u64 {
    match value {
        redis::Value::Int(i) => *i as u64,
        redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).parse().unwrap_or(0),
        redis::Value::SimpleString(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn fields_to_map(value: &redis::Value) -> HashMap<String, redis::Value> {
    let mut map = HashMap::new();
    if let redis::Value::Array(pairs) = value {
        let mut iter = pairs.iter();
        while let (Some(key), Some(val)) = (iter.next(), iter.next()) {
            map.insert(value_to_string(key), val.clone());
        }
    } else if let redis::Value::Map(entries) = value {
        for (key, val) in entries {
            map.insert(value_to_string(key), val.clone());
        }
    }
    map
}
