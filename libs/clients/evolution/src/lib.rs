//! Client for the WhatsApp gateway (Evolution API).
//!
//! Outbound surface: send a text reply (optionally quoting the message being
//! answered), toggle the typing indicator, and mark a message as read. Every
//! call carries the `apikey` header and is guarded by a circuit breaker.

use async_trait::async_trait;
use core_config::gateway::GatewayConfig;
use resilience::{BreakerRegistry, CallError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An outgoing reply to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub instance_id: String,
    pub phone_number: String,
    pub content: String,
    /// Gateway ID of the message being replied to.
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Body shape expected by `POST /message/sendText/{instance}`.
    fn to_gateway_body(&self) -> Value {
        let mut body = json!({
            "number": self.phone_number,
            "text": self.content,
        });
        if let Some(reply_to) = &self.reply_to {
            body["quoted"] = json!({ "key": { "id": reply_to } });
        }
        body
    }
}

/// Outbound message surface; the worker depends on this trait so tests can
/// capture replies instead of reaching a gateway.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a text reply. Returns the gateway's message ID when provided.
    async fn send_text(&self, message: &OutgoingMessage) -> Result<Option<String>, CallError>;

    /// Toggle the typing indicator for a conversation.
    async fn set_typing(
        &self,
        instance_id: &str,
        phone_number: &str,
        typing: bool,
    ) -> Result<(), CallError>;

    /// Mark an inbound message as read.
    async fn mark_read(&self, instance_id: &str, message_id: &str) -> Result<(), CallError>;
}

/// HTTP client for the Evolution API.
pub struct EvolutionClient {
    client: reqwest::Client,
    config: GatewayConfig,
    breakers: Arc<BreakerRegistry>,
}

impl EvolutionClient {
    pub fn new(config: GatewayConfig, breakers: Arc<BreakerRegistry>) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CallError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            breakers,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, CallError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::timeout(e.to_string())
                } else {
                    CallError::connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(
                status.as_u16(),
                format!("gateway returned {}: {}", status, text),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CallError::validation(format!("invalid JSON from gateway: {}", e)))
    }

    /// Whether the gateway answers at all (any HTTP status counts).
    ///
    /// Used by readiness probes; the gateway is a soft dependency, so an
    /// unreachable gateway degrades the service instead of failing it.
    pub async fn reachable(&self) -> bool {
        let url = self.config.base_url.trim_end_matches('/').to_string();
        self.client
            .get(&url)
            .header("apikey", &self.config.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}

#[async_trait]
impl MessageSender for EvolutionClient {
    async fn send_text(&self, message: &OutgoingMessage) -> Result<Option<String>, CallError> {
        let breaker = self.breakers.breaker("gateway", "send_text");
        breaker.check()?;

        let path = format!("/message/sendText/{}", message.instance_id);
        let result = self.post(&path, &message.to_gateway_body()).await;

        match result {
            Ok(response) => {
                breaker.record_success();
                let message_id = response
                    .pointer("/key/id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                info!(
                    instance_id = %message.instance_id,
                    phone = %message.phone_number,
                    gateway_message_id = ?message_id,
                    "Reply sent to gateway"
                );
                Ok(message_id)
            }
            Err(e) => {
                breaker.record_failure();
                Err(e)
            }
        }
    }

    async fn set_typing(
        &self,
        instance_id: &str,
        phone_number: &str,
        typing: bool,
    ) -> Result<(), CallError> {
        let breaker = self.breakers.breaker("gateway", "set_typing");
        breaker.check()?;

        let path = format!("/chat/presence/{}", instance_id);
        let body = json!({
            "number": phone_number,
            "presence": if typing { "composing" } else { "paused" },
        });

        match self.post(&path, &body).await {
            Ok(_) => {
                breaker.record_success();
                debug!(instance_id = %instance_id, typing = %typing, "Typing indicator updated");
                Ok(())
            }
            Err(e) => {
                breaker.record_failure();
                // Presence updates are cosmetic; callers treat this as soft
                warn!(error = %e, "Failed to update typing indicator");
                Err(e)
            }
        }
    }

    async fn mark_read(&self, instance_id: &str, message_id: &str) -> Result<(), CallError> {
        let breaker = self.breakers.breaker("gateway", "mark_read");
        breaker.check()?;

        let path = format!("/chat/markMessageAsRead/{}", instance_id);
        let body = json!({ "readMessages": [{ "id": message_id }] });

        match self.post(&path, &body).await {
            Ok(_) => {
                breaker.record_success();
                Ok(())
            }
            Err(e) => {
                breaker.record_failure();
                Err(e)
            }
        }
    }
}
