//! System load sampling for the backpressure gate.

use core_config::admission::AdmissionConfig;
use metrics::gauge;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Bucketed load level derived from queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl LoadLevel {
    /// Derive the level from `adjusted_load` against the critical threshold.
    pub fn from_load(adjusted_load: u64, queue_threshold: u64) -> Self {
        let threshold = queue_threshold.max(1);
        if adjusted_load >= threshold {
            Self::Critical
        } else if adjusted_load * 10 >= threshold * 8 {
            Self::High
        } else if adjusted_load * 10 >= threshold * 5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sampled view of the system load.
#[derive(Debug, Clone)]
pub struct LoadSnapshot {
    pub stream_length: u64,
    pub pending_count: u64,
    pub dlq_length: u64,
    pub adjusted_load: u64,
    pub level: LoadLevel,
}

impl LoadSnapshot {
    /// DLQ growth is weighted double: a filling DLQ means the pipeline is
    /// failing, not merely busy.
    pub fn compute(
        stream_length: u64,
        pending_count: u64,
        dlq_length: u64,
        queue_threshold: u64,
    ) -> Self {
        let adjusted_load = stream_length + pending_count + 2 * dlq_length;
        Self {
            stream_length,
            pending_count,
            dlq_length,
            adjusted_load,
            level: LoadLevel::from_load(adjusted_load, queue_threshold),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.level == LoadLevel::Critical
    }

    /// Retry-After for rejected requests: load-proportional, clamped to [10, 60].
    pub fn retry_after_secs(&self) -> u64 {
        (self.adjusted_load / 50).clamp(10, 60)
    }
}

impl Default for LoadSnapshot {
    fn default() -> Self {
        Self {
            stream_length: 0,
            pending_count: 0,
            dlq_length: 0,
            adjusted_load: 0,
            level: LoadLevel::Low,
        }
    }
}

struct CachedSnapshot {
    snapshot: LoadSnapshot,
    taken_at: Option<Instant>,
}

/// Samples `(XLEN, XPENDING, DLQ XLEN)` for the primary topic, caching the
/// result for `check_interval` to keep the hot path off Redis.
pub struct LoadMonitor {
    redis: ConnectionManager,
    stream_name: String,
    dlq_name: String,
    consumer_group: String,
    config: AdmissionConfig,
    cached: RwLock<CachedSnapshot>,
}

impl LoadMonitor {
    pub fn new(
        redis: ConnectionManager,
        stream_name: impl Into<String>,
        consumer_group: impl Into<String>,
        config: AdmissionConfig,
    ) -> Self {
        let stream_name = stream_name.into();
        let dlq_name = format!("{}:dlq", stream_name);
        Self {
            redis,
            stream_name,
            dlq_name,
            consumer_group: consumer_group.into(),
            config,
            cached: RwLock::new(CachedSnapshot {
                snapshot: LoadSnapshot::default(),
                taken_at: None,
            }),
        }
    }

    /// Current load snapshot, refreshed at most every `check_interval`.
    ///
    /// Sampling failures return the last known snapshot so a Redis blip does
    /// not turn into a rejection storm.
    pub async fn snapshot(&self) -> LoadSnapshot {
        let check_interval = Duration::from_secs(self.config.check_interval_secs);

        {
            let cached = self.cached.read().await;
            if let Some(taken_at) = cached.taken_at {
                if taken_at.elapsed() < check_interval {
                    return cached.snapshot.clone();
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(taken_at) = cached.taken_at {
            if taken_at.elapsed() < check_interval {
                return cached.snapshot.clone();
            }
        }

        match self.sample().await {
            Ok(snapshot) => {
                gauge!("queue_depth", "stream" => self.stream_name.clone())
                    .set(snapshot.stream_length as f64);
                gauge!("queue_depth", "stream" => self.dlq_name.clone())
                    .set(snapshot.dlq_length as f64);

                if snapshot.is_overloaded() {
                    warn!(
                        stream_length = %snapshot.stream_length,
                        pending = %snapshot.pending_count,
                        dlq = %snapshot.dlq_length,
                        level = %snapshot.level,
                        "System overloaded"
                    );
                } else {
                    debug!(
                        adjusted_load = %snapshot.adjusted_load,
                        level = %snapshot.level,
                        "Load snapshot refreshed"
                    );
                }

                cached.snapshot = snapshot.clone();
                cached.taken_at = Some(Instant::now());
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Failed to sample system load, using last snapshot");
                cached.taken_at = Some(Instant::now());
                cached.snapshot.clone()
            }
        }
    }

    async fn sample(&self) -> Result<LoadSnapshot, redis::RedisError> {
        let mut conn = self.redis.clone();

        let stream_length: u64 = redis::cmd("XLEN")
            .arg(&self.stream_name)
            .query_async(&mut conn)
            .await
            .unwrap_or(0);

        let dlq_length: u64 = redis::cmd("XLEN")
            .arg(&self.dlq_name)
            .query_async(&mut conn)
            .await
            .unwrap_or(0);

        // XPENDING summary form: [count, min-id, max-id, consumers]
        let pending_count: u64 = match redis::cmd("XPENDING")
            .arg(&self.stream_name)
            .arg(&self.consumer_group)
            .query_async::<redis::Value>(&mut conn)
            .await
        {
            Ok(redis::Value::Array(fields)) => match fields.first() {
                Some(redis::Value::Int(count)) => *count as u64,
                _ => 0,
            },
            _ => 0,
        };

        Ok(LoadSnapshot::compute(
            stream_length,
            pending_count,
            dlq_length,
            self.config.queue_threshold,
        ))
    }
}
