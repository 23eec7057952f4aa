//! Idempotency store: observed gateway message IDs and reply guards.
//!
//! Keys expire after the retention window, which must cover the gateway's
//! replay horizon (at least 24 h).

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

/// Retention for idempotency records; covers gateway replay windows.
const SEEN_TTL_SECS: u64 = 48 * 3_600;

/// Redis-backed idempotency store.
#[derive(Clone)]
pub struct IdempotencyStore {
    redis: ConnectionManager,
}

impl IdempotencyStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn seen_key(gateway_message_id: &str) -> String {
        format!("seen:{}", gateway_message_id)
    }

    fn processed_key(stream_id: &str) -> String {
        format!("processed:{}", stream_id)
    }

    /// Whether this gateway message ID was already observed.
    pub async fn seen(&self, gateway_message_id: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(Self::seen_key(gateway_message_id)).await?;
        Ok(exists)
    }

    /// Record a gateway message ID as observed.
    pub async fn mark_seen(&self, gateway_message_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .set_ex(
                Self::seen_key(gateway_message_id),
                Utc::now().to_rfc3339(),
                SEEN_TTL_SECS,
            )
            .await?;
        debug!(gateway_message_id = %gateway_message_id, "Marked message as seen");
        Ok(())
    }

    /// Atomically observe-and-record in one step (SET NX EX).
    ///
    /// Returns `true` when this call was the first observer.
    pub async fn check_and_mark_seen(
        &self,
        gateway_message_id: &str,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.clone();

        let set: Option<String> = redis::cmd("SET")
            .arg(Self::seen_key(gateway_message_id))
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .arg("EX")
            .arg(SEEN_TTL_SECS)
            .query_async(&mut conn)
            .await?;

        Ok(set.is_some())
    }

    /// Reply guard: claim the right to send the reply for a stream entry.
    ///
    /// Set-if-absent keyed by stream ID, so a consumer that claims a
    /// redelivered entry after a crash-between-reply-and-ack will find the
    /// guard taken and not send a duplicate reply.
    pub async fn try_mark_processed(&self, stream_id: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.clone();

        let set: Option<String> = redis::cmd("SET")
            .arg(Self::processed_key(stream_id))
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .arg("EX")
            .arg(SEEN_TTL_SECS)
            .query_async(&mut conn)
            .await?;

        Ok(set.is_some())
    }

    /// Release a reply guard after a failed send, so the retry may send.
    pub async fn clear_processed(&self, stream_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(Self::processed_key(stream_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(IdempotencyStore::seen_key("M1"), "seen:M1");
        assert_eq!(
            IdempotencyStore::processed_key("1700000000000-0"),
            "processed:1700000000000-0"
        );
    }

    #[test]
    fn test_ttl_covers_replay_window() {
        assert!(SEEN_TTL_SECS >= 24 * 3_600);
    }
}
