//! Dead Letter Queue (DLQ) management
//!
//! Entries that exhausted their retries (or failed non-retryably) land in a
//! parallel stream, mirrored into a sorted-set index keyed by failure time
//! so admin queries can filter by range without scanning the stream.

use crate::error::{DlqCategory, StreamError};
use crate::producer::StreamProducer;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Type alias for Redis stream range replies
type StreamEntries = Vec<(String, Vec<(String, String)>)>;

/// A parsed DLQ entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    /// DLQ stream ID of this entry.
    pub id: String,
    /// Original payload (the `data` field of the failed envelope).
    pub payload: Value,
    /// Error text that caused the failure.
    pub error: String,
    /// Categorized error class.
    pub error_category: String,
    /// When the entry was dead-lettered.
    pub failed_at: DateTime<Utc>,
    /// Stream the entry originally lived on.
    pub original_queue: String,
    /// Stream ID of the original entry.
    pub original_stream_id: String,
    /// Retry count at the time of failure.
    pub retry_count: u32,
    /// Message kind recorded for failure analysis.
    pub message_kind: String,
    /// Originating service.
    pub source: String,
    /// Free-form metadata.
    pub metadata: Value,
}

/// DLQ statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStats {
    pub queue: String,
    pub current_size: u64,
    pub total_failed: u64,
    pub reprocessed: u64,
    pub purged: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub error_categories: HashMap<String, u64>,
}

/// Failure-pattern analysis over a recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqAnalysis {
    pub analysis_period_hours: i64,
    pub total_failures: usize,
    pub by_message_kind: HashMap<String, u64>,
    pub by_error_category: HashMap<String, u64>,
    pub by_source: HashMap<String, u64>,
    pub by_hour: HashMap<String, u64>,
    pub top_errors: Vec<TopError>,
}

/// One aggregated error string with occurrence counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopError {
    pub error: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Filters for listing DLQ entries.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub limit: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_kind: Option<String>,
    pub error_category: Option<DlqCategory>,
}

/// Dead Letter Queue manager.
pub struct DlqManager {
    redis: Arc<ConnectionManager>,
    source_stream: String,
    dlq_stream: String,
    max_length: i64,
}

impl DlqManager {
    /// Create a new DlqManager.
    pub fn new(
        redis: ConnectionManager,
        source_stream: impl Into<String>,
        dlq_stream: impl Into<String>,
    ) -> Self {
        Self {
            redis: Arc::new(redis),
            source_stream: source_stream.into(),
            dlq_stream: dlq_stream.into(),
            max_length: 10_000,
        }
    }

    /// Set the maximum DLQ length.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Get the DLQ stream name.
    pub fn dlq_stream(&self) -> &str {
        &self.dlq_stream
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.dlq_stream)
    }

    /// Dead-letter a failed payload.
    ///
    /// `payload` is the JSON text of the original `data` field so the entry
    /// can be republished verbatim by `reprocess`.
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        original_stream_id: &str,
        payload: &str,
        error: &str,
        category: DlqCategory,
        retry_count: u32,
        message_kind: &str,
        source: &str,
        metadata: Option<Value>,
    ) -> Result<String, StreamError> {
        let mut conn = (*self.redis).clone();
        let failed_at = Utc::now();

        let dlq_id: String = redis::cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("data")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("error_category")
            .arg(category.as_str())
            .arg("failed_at")
            .arg(failed_at.to_rfc3339())
            .arg("original_queue")
            .arg(&self.source_stream)
            .arg("original_message_id")
            .arg(original_stream_id)
            .arg("retry_count")
            .arg(retry_count.to_string())
            .arg("message_type")
            .arg(message_kind)
            .arg("source")
            .arg(source)
            .arg("metadata")
            .arg(
                metadata
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "{}".to_string()),
            )
            .query_async(&mut conn)
            .await?;

        // Sorted-set index by failure time for range queries
        let _: () = conn
            .zadd(self.index_key(), &dlq_id, failed_at.timestamp() as f64)
            .await?;

        // Running counters
        let _: () = conn.incr(format!("{}:total", self.dlq_stream), 1u64).await?;
        let _: () = conn
            .incr(
                format!("{}:errors:{}", self.dlq_stream, category.as_str()),
                1u64,
            )
            .await?;

        info!(
            dlq_id = %dlq_id,
            original_stream_id = %original_stream_id,
            error_category = %category,
            retry_count = %retry_count,
            "Moved entry to DLQ"
        );

        Ok(dlq_id)
    }

    /// Current DLQ length.
    pub async fn length(&self) -> Result<u64, StreamError> {
        let mut conn = (*self.redis).clone();
        let len: u64 = conn.xlen(&self.dlq_stream).await.unwrap_or(0);
        Ok(len)
    }

    /// List DLQ entries with optional filtering.
    pub async fn list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, StreamError> {
        let mut conn = (*self.redis).clone();
        let limit = if filter.limit == 0 { 100 } else { filter.limit };

        let raw: StreamEntries = if filter.start_time.is_some() || filter.end_time.is_some() {
            // Time-bounded query goes through the index
            let start = filter
                .start_time
                .map(|t| t.timestamp().to_string())
                .unwrap_or_else(|| "-inf".to_string());
            let end = filter
                .end_time
                .map(|t| t.timestamp().to_string())
                .unwrap_or_else(|| "+inf".to_string());

            let ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
                .arg(self.index_key())
                .arg(&start)
                .arg(&end)
                .arg("LIMIT")
                .arg(0)
                .arg(limit)
                .query_async(&mut conn)
                .await
                .unwrap_or_default();

            let mut entries = Vec::new();
            for id in ids {
                let found: StreamEntries = redis::cmd("XRANGE")
                    .arg(&self.dlq_stream)
                    .arg(&id)
                    .arg(&id)
                    .query_async(&mut conn)
                    .await
                    .unwrap_or_default();
                entries.extend(found);
            }
            entries
        } else {
            // Latest entries first
            redis::cmd("XREVRANGE")
                .arg(&self.dlq_stream)
                .arg("+")
                .arg("-")
                .arg("COUNT")
                .arg(limit)
                .query_async(&mut conn)
                .await
                .unwrap_or_default()
        };

        let mut result = Vec::new();
        for (id, fields) in raw {
            let Some(entry) = Self::parse_entry(&id, &fields) else {
                warn!(dlq_id = %id, "Skipping unparseable DLQ entry");
                continue;
            };

            if let Some(kind) = &filter.message_kind {
                if &entry.message_kind != kind {
                    continue;
                }
            }
            if let Some(category) = filter.error_category {
                if entry.error_category != category.as_str() {
                    continue;
                }
            }

            result.push(entry);
        }

        Ok(result)
    }

    /// Get a specific DLQ entry by ID.
    pub async fn get(&self, dlq_id: &str) -> Result<Option<DlqEntry>, StreamError> {
        let mut conn = (*self.redis).clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg(dlq_id)
            .arg(dlq_id)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .first()
            .and_then(|(id, fields)| Self::parse_entry(id, fields)))
    }

    /// Reprocess a DLQ entry back into the primary stream.
    ///
    /// Returns `false` when the entry does not exist. On success the payload
    /// is republished (with `reprocessed_from_dlq: true` and, when
    /// `reset_retry` is set, `retry_count: 0`) and the DLQ entry is removed.
    pub async fn reprocess(
        &self,
        dlq_id: &str,
        target_queue: Option<&str>,
        reset_retry: bool,
    ) -> Result<bool, StreamError> {
        let Some(entry) = self.get(dlq_id).await? else {
            return Ok(false);
        };

        let mut payload = entry.payload.clone();
        let retry_count = if reset_retry { 0 } else { entry.retry_count };
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("retry_count".to_string(), Value::from(retry_count));
            obj.insert("reprocessed_from_dlq".to_string(), Value::from(true));
            obj.insert(
                "dlq_entry_id".to_string(),
                Value::from(dlq_id.to_string()),
            );
            obj.insert(
                "reprocessed_at".to_string(),
                Value::from(Utc::now().to_rfc3339()),
            );
        }

        let queue = target_queue.unwrap_or(&entry.original_queue);
        let producer = StreamProducer::new((*self.redis).clone(), queue);
        let new_id = producer
            .publish_raw(&payload.to_string(), retry_count, 1, "dlq_reprocess")
            .await?;

        let mut conn = (*self.redis).clone();
        let _: () = conn.xdel(&self.dlq_stream, &[dlq_id]).await?;
        let _: () = conn.zrem(self.index_key(), dlq_id).await?;
        let _: () = conn
            .incr(format!("{}:reprocessed", self.dlq_stream), 1u64)
            .await?;

        info!(
            dlq_id = %dlq_id,
            new_stream_id = %new_id,
            queue = %queue,
            reset_retry = %reset_retry,
            "Reprocessed DLQ entry"
        );

        Ok(true)
    }

    /// Reprocess a batch of entries, returning per-ID outcomes.
    pub async fn bulk_reprocess(
        &self,
        dlq_ids: &[String],
        target_queue: Option<&str>,
    ) -> Result<HashMap<String, bool>, StreamError> {
        let mut results = HashMap::new();

        for dlq_id in dlq_ids {
            let outcome = match self.reprocess(dlq_id, target_queue, true).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(dlq_id = %dlq_id, error = %e, "Bulk reprocess failed for entry");
                    false
                }
            };
            results.insert(dlq_id.clone(), outcome);
        }

        Ok(results)
    }

    /// Delete an entry without reprocessing it.
    pub async fn delete(&self, dlq_id: &str) -> Result<bool, StreamError> {
        let mut conn = (*self.redis).clone();

        let deleted: i64 = conn.xdel(&self.dlq_stream, &[dlq_id]).await?;
        let _: () = conn.zrem(self.index_key(), dlq_id).await?;

        debug!(dlq_id = %dlq_id, "Deleted DLQ entry");
        Ok(deleted > 0)
    }

    /// Purge entries older than the given number of days.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, StreamError> {
        let mut conn = (*self.redis).clone();
        let cutoff = Utc::now() - ChronoDuration::days(days);

        let old_ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.index_key())
            .arg("-inf")
            .arg(cutoff.timestamp())
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        if old_ids.is_empty() {
            return Ok(0);
        }

        let _: () = conn.xdel(&self.dlq_stream, &old_ids).await?;
        let id_refs: Vec<&str> = old_ids.iter().map(|s| s.as_str()).collect();
        let _: () = conn.zrem(self.index_key(), id_refs).await?;
        let _: () = conn
            .incr(format!("{}:purged", self.dlq_stream), old_ids.len() as u64)
            .await?;

        info!(count = old_ids.len(), days = %days, "Purged old DLQ entries");
        Ok(old_ids.len() as u64)
    }

    /// Comprehensive DLQ statistics.
    pub async fn stats(&self) -> Result<DlqStats, StreamError> {
        let mut conn = (*self.redis).clone();

        let current_size: u64 = conn.xlen(&self.dlq_stream).await.unwrap_or(0);
        let total_failed: u64 = conn
            .get(format!("{}:total", self.dlq_stream))
            .await
            .unwrap_or(0);
        let reprocessed: u64 = conn
            .get(format!("{}:reprocessed", self.dlq_stream))
            .await
            .unwrap_or(0);
        let purged: u64 = conn
            .get(format!("{}:purged", self.dlq_stream))
            .await
            .unwrap_or(0);

        let oldest: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();
        let newest: StreamEntries = redis::cmd("XREVRANGE")
            .arg(&self.dlq_stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        let mut error_categories = HashMap::new();
        for category in [
            DlqCategory::Timeout,
            DlqCategory::Connection,
            DlqCategory::RateLimit,
            DlqCategory::Auth,
            DlqCategory::Validation,
            DlqCategory::Other,
        ] {
            let count: u64 = conn
                .get(format!("{}:errors:{}", self.dlq_stream, category.as_str()))
                .await
                .unwrap_or(0);
            if count > 0 {
                error_categories.insert(category.as_str().to_string(), count);
            }
        }

        Ok(DlqStats {
            queue: self.source_stream.clone(),
            current_size,
            total_failed,
            reprocessed,
            purged,
            oldest_entry: oldest
                .first()
                .and_then(|(id, fields)| Self::parse_entry(id, fields))
                .map(|e| e.failed_at),
            newest_entry: newest
                .first()
                .and_then(|(id, fields)| Self::parse_entry(id, fields))
                .map(|e| e.failed_at),
            error_categories,
        })
    }

    /// Analyze failure patterns over the last `hours_back` hours.
    pub async fn analyze(&self, hours_back: i64) -> Result<DlqAnalysis, StreamError> {
        let filter = DlqFilter {
            limit: 1000,
            start_time: Some(Utc::now() - ChronoDuration::hours(hours_back)),
            ..Default::default()
        };
        let entries = self.list(&filter).await?;

        let mut by_message_kind: HashMap<String, u64> = HashMap::new();
        let mut by_error_category: HashMap<String, u64> = HashMap::new();
        let mut by_source: HashMap<String, u64> = HashMap::new();
        let mut by_hour: HashMap<String, u64> = HashMap::new();

        for entry in &entries {
            *by_message_kind.entry(entry.message_kind.clone()).or_insert(0) += 1;
            *by_error_category
                .entry(entry.error_category.clone())
                .or_insert(0) += 1;
            *by_source.entry(entry.source.clone()).or_insert(0) += 1;
            let hour_key = entry.failed_at.format("%Y-%m-%d %H:00").to_string();
            *by_hour.entry(hour_key).or_insert(0) += 1;
        }

        Ok(DlqAnalysis {
            analysis_period_hours: hours_back,
            total_failures: entries.len(),
            by_message_kind,
            by_error_category,
            by_source,
            by_hour,
            top_errors: Self::top_errors(&entries, 10),
        })
    }

    fn top_errors(entries: &[DlqEntry], top_n: usize) -> Vec<TopError> {
        let mut aggregated: HashMap<String, TopError> = HashMap::new();

        for entry in entries {
            // Truncate for grouping so long errors with variable suffixes bucket together
            let key: String = entry.error.chars().take(200).collect();
            let item = aggregated.entry(key.clone()).or_insert_with(|| TopError {
                error: key,
                count: 0,
                first_seen: entry.failed_at,
                last_seen: entry.failed_at,
            });
            item.count += 1;
            if entry.failed_at < item.first_seen {
                item.first_seen = entry.failed_at;
            }
            if entry.failed_at > item.last_seen {
                item.last_seen = entry.failed_at;
            }
        }

        let mut result: Vec<TopError> = aggregated.into_values().collect();
        result.sort_by(|a, b| b.count.cmp(&a.count));
        result.truncate(top_n);
        result
    }

    fn parse_entry(id: &str, fields: &[(String, String)]) -> Option<DlqEntry> {
        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        let payload: Value = serde_json::from_str(&field("data")?).ok()?;
        let error = field("error")?;
        let error_category = field("error_category")
            .unwrap_or_else(|| DlqCategory::from_text(&error).as_str().to_string());
        let failed_at = field("failed_at")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))?;

        Some(DlqEntry {
            id: id.to_string(),
            payload,
            error,
            error_category,
            failed_at,
            original_queue: field("original_queue").unwrap_or_default(),
            original_stream_id: field("original_message_id").unwrap_or_default(),
            retry_count: field("retry_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            message_kind: field("message_type").unwrap_or_else(|| "unknown".to_string()),
            source: field("source").unwrap_or_else(|| "unknown".to_string()),
            metadata: field("metadata")
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| Value::Object(Default::default())),
        })
    }
}

impl Clone for DlqManager {
    fn clone(&self) -> Self {
        Self {
            redis: Arc::clone(&self.redis),
            source_stream: self.source_stream.clone(),
            dlq_stream: self.dlq_stream.clone(),
            max_length: self.max_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_entry_full() {
        let entry = DlqManager::parse_entry(
            "1700000000000-0",
            &fields(&[
                ("data", r#"{"gateway_message_id":"M1"}"#),
                ("error", "request timeout after 30s"),
                ("error_category", "timeout"),
                ("failed_at", "2024-01-15T10:00:00+00:00"),
                ("original_queue", "messages:stream"),
                ("original_message_id", "1699999999999-0"),
                ("retry_count", "3"),
                ("message_type", "text"),
                ("source", "webhook_api"),
                ("metadata", r#"{"instance":"I1"}"#),
            ]),
        )
        .unwrap();

        assert_eq!(entry.id, "1700000000000-0");
        assert_eq!(entry.error_category, "timeout");
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.message_kind, "text");
        assert_eq!(entry.original_queue, "messages:stream");
        assert_eq!(entry.payload["gateway_message_id"], "M1");
        assert_eq!(entry.metadata["instance"], "I1");
    }

    #[test]
    fn test_parse_entry_derives_category_from_error() {
        let entry = DlqManager::parse_entry(
            "1-0",
            &fields(&[
                ("data", "{}"),
                ("error", "connection refused"),
                ("failed_at", "2024-01-15T10:00:00+00:00"),
            ]),
        )
        .unwrap();

        assert_eq!(entry.error_category, "connection");
    }

    #[test]
    fn test_parse_entry_rejects_missing_fields() {
        assert!(DlqManager::parse_entry("1-0", &fields(&[("error", "x")])).is_none());
        assert!(DlqManager::parse_entry("1-0", &fields(&[("data", "{}")])).is_none());
    }

    #[test]
    fn test_top_errors_aggregation() {
        let at = Utc::now();
        let entry = |error: &str| DlqEntry {
            id: "1-0".to_string(),
            payload: Value::Null,
            error: error.to_string(),
            error_category: "other".to_string(),
            failed_at: at,
            original_queue: "q".to_string(),
            original_stream_id: "1-0".to_string(),
            retry_count: 0,
            message_kind: "text".to_string(),
            source: "s".to_string(),
            metadata: Value::Null,
        };

        let entries = vec![entry("boom"), entry("boom"), entry("bang")];
        let top = DlqManager::top_errors(&entries, 10);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].error, "boom");
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_dlq_entry_serialization() {
        let entry = DlqEntry {
            id: "1-0".to_string(),
            payload: serde_json::json!({"test": "data"}),
            error: "Test error".to_string(),
            error_category: "other".to_string(),
            failed_at: Utc::now(),
            original_queue: "messages:stream".to_string(),
            original_stream_id: "1234567890123-0".to_string(),
            retry_count: 3,
            message_kind: "audio".to_string(),
            source: "webhook_api".to_string(),
            metadata: serde_json::json!({}),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: DlqEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, "1-0");
        assert_eq!(deserialized.retry_count, 3);
        assert_eq!(deserialized.message_kind, "audio");
    }
}
