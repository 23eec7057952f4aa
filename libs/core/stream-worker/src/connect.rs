//! Redis connection bootstrap.

use redis::aio::ConnectionManager;
use redis::Client;
use resilience::RetryPolicy;
use tracing::{info, warn};

/// Connect to Redis and return a ConnectionManager.
///
/// The ConnectionManager handles reconnections transparently after the
/// initial connection succeeds; the PING verifies the server is reachable
/// before the caller proceeds.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!("Attempting to connect to Redis at {}", url);

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Successfully connected to Redis");
    Ok(manager)
}

/// Connect to Redis with retry on startup failure.
///
/// Uses the shared retry policy's backoff-with-jitter schedule; handy while
/// Redis and the service race each other during deployment.
pub async fn connect_with_retry(
    url: &str,
    policy: Option<RetryPolicy>,
) -> redis::RedisResult<ConnectionManager> {
    let policy = policy.unwrap_or_else(|| {
        RetryPolicy::new(5).with_base_delay(std::time::Duration::from_millis(500))
    });

    let mut attempt: u32 = 1;
    loop {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = %attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_connect() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let result = connect(&redis_url).await;
        assert!(result.is_ok());
    }
}
