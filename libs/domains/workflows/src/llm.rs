//! The LLM chat surface.
//!
//! Workflows speak to an abstract chat interface; any OpenAI-compatible
//! chat-completion endpoint satisfies it. In development (or without an API
//! key) the deterministic echo model stands in so the pipeline works end to
//! end with no external provider.

use async_trait::async_trait;
use core_config::llm::LlmConfig;
use resilience::CallError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Abstract chat completion surface.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a chat exchange, returning the assistant's text.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<String, CallError>;
}

/// Deterministic echo model for development and tests.
///
/// Echoes a truncated copy of the last message so prompt plumbing is
/// visible without a provider.
#[derive(Default)]
pub struct EchoModel;

#[async_trait]
impl ChatModel for EchoModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _temperature: Option<f32>,
    ) -> Result<String, CallError> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let truncated: String = last.chars().take(400).collect();
        Ok(format!("[dev] {}", truncated))
    }
}

/// HTTP chat model for OpenAI-compatible providers.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatModel {
    pub fn new(config: LlmConfig) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CallError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Pick the model for this configuration: HTTP when a provider key is
    /// configured, echo otherwise.
    pub fn from_config(
        config: &LlmConfig,
        is_development: bool,
    ) -> Result<std::sync::Arc<dyn ChatModel>, CallError> {
        if is_development || !config.has_provider() {
            debug!("Using echo chat model (development mode or no API key)");
            Ok(std::sync::Arc::new(EchoModel))
        } else {
            Ok(std::sync::Arc::new(Self::new(config.clone())?))
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<String, CallError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );

        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature.unwrap_or(self.config.temperature),
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
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
                format!("chat provider returned {}: {}", status, text),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CallError::validation(format!("invalid JSON from provider: {}", e)))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CallError::validation("provider response missing content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_model_echoes_last_message() {
        let model = EchoModel;
        let reply = model
            .chat(
                &[
                    ChatMessage::system("ignored"),
                    ChatMessage::user("extract criteria from: casa 3 quartos"),
                ],
                None,
            )
            .await
            .unwrap();

        assert!(reply.starts_with("[dev] "));
        assert!(reply.contains("casa 3 quartos"));
    }

    #[tokio::test]
    async fn test_echo_model_truncates() {
        let model = EchoModel;
        let long = "x".repeat(1000);
        let reply = model.chat(&[ChatMessage::user(long)], None).await.unwrap();
        assert!(reply.chars().count() <= 406);
    }

    #[test]
    fn test_from_config_prefers_echo_in_development() {
        let config = LlmConfig {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: Some("sk-test".to_string()),
            model: "gpt-4".to_string(),
            temperature: 0.1,
        };

        // Development forces the echo model even with a key configured
        assert!(HttpChatModel::from_config(&config, true).is_ok());
        assert!(HttpChatModel::from_config(&config, false).is_ok());
    }

    #[test]
    fn test_chat_message_serde() {
        let msg = ChatMessage::user("Olá");
        let raw = serde_json::to_value(&msg).unwrap();
        assert_eq!(raw["role"], "user");
        assert_eq!(raw["content"], "Olá");
    }
}
