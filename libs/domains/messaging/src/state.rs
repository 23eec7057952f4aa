//! Per-conversation state: last-timestamp marker and admission lock.
//!
//! The lock only covers the webhook handler's enqueue decision; it is never
//! held across workflow execution. Workers rely on stream IDs, not this
//! lock, for processing order.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// TTL for the last-timestamp marker.
const LAST_TS_TTL_SECS: u64 = 3_600;

/// Redis-backed conversation state store.
#[derive(Clone)]
pub struct ConversationStateStore {
    redis: ConnectionManager,
}

impl ConversationStateStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn last_ts_key(conversation_key: &str) -> String {
        format!("conv:{}:last_ts", conversation_key)
    }

    fn lock_key(conversation_key: &str) -> String {
        format!("conv:{}:lock", conversation_key)
    }

    /// Last processed message timestamp for the conversation, if tracked.
    pub async fn last_timestamp(
        &self,
        conversation_key: &str,
    ) -> Result<Option<DateTime<Utc>>, redis::RedisError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(Self::last_ts_key(conversation_key)).await?;

        Ok(value.and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        }))
    }

    /// Update the last processed timestamp (1 hour TTL).
    pub async fn set_last_timestamp(
        &self,
        conversation_key: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .set_ex(
                Self::last_ts_key(conversation_key),
                timestamp.to_rfc3339(),
                LAST_TS_TTL_SECS,
            )
            .await?;
        Ok(())
    }

    /// Whether a message with this timestamp arrives out of order.
    pub async fn is_out_of_order(
        &self,
        conversation_key: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, redis::RedisError> {
        let last = self.last_timestamp(conversation_key).await?;
        if let Some(last_ts) = last {
            if timestamp < last_ts {
                warn!(
                    conversation_key = %conversation_key,
                    message_ts = %timestamp,
                    last_ts = %last_ts,
                    "Out-of-order message detected"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Try to take the conversation admission lock (atomic SET NX EX).
    ///
    /// Returns `false` when another webhook request holds it.
    pub async fn try_acquire_lock(
        &self,
        conversation_key: &str,
        ttl_secs: u64,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(conversation_key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;

        let acquired = acquired.is_some();
        debug!(
            conversation_key = %conversation_key,
            acquired = %acquired,
            ttl_secs = %ttl_secs,
            "Conversation lock attempt"
        );
        Ok(acquired)
    }

    /// Release the conversation lock.
    pub async fn release_lock(&self, conversation_key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(Self::lock_key(conversation_key)).await?;
        Ok(())
    }
}
