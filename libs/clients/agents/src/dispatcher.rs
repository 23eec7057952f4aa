//! HTTP dispatcher for the agent fleet.

use crate::task::{AgentKind, AgentTask, TaskMethod};
use async_trait::async_trait;
use core_config::agents::{AgentEndpoint, AgentsConfig};
use resilience::{retry_with_policy, BreakerRegistry, CallError, RetryPolicy};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Dispatch surface for agent calls.
///
/// The pipeline and workflow nodes depend on this trait, not on the HTTP
/// implementation, so tests inject in-memory fakes through the constructor.
#[async_trait]
pub trait AgentDispatch: Send + Sync {
    /// Execute one typed task and return the agent's JSON response.
    async fn execute(&self, correlation_id: &str, task: AgentTask) -> Result<Value, CallError>;

    /// Probe one agent's health endpoint.
    async fn health_check(&self, agent: AgentKind) -> bool {
        let _ = agent;
        true
    }
}

/// The structured failure shape surfaced to workflow nodes.
pub fn failure_payload(agent: AgentKind, error: &CallError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
        "agent": agent.to_string(),
    })
}

/// Reqwest-backed dispatcher with per-(agent, function) breakers and a
/// bounded retry policy (3 attempts, 1 s base, factor 2).
pub struct HttpAgentDispatcher {
    client: reqwest::Client,
    config: AgentsConfig,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
}

impl HttpAgentDispatcher {
    pub fn new(config: AgentsConfig, breakers: Arc<BreakerRegistry>) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CallError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            breakers,
            retry: RetryPolicy::default(),
        })
    }

    fn endpoint(&self, agent: AgentKind) -> &AgentEndpoint {
        match agent {
            AgentKind::Transcription => &self.config.transcription,
            AgentKind::Rag => &self.config.rag,
            AgentKind::Memory => &self.config.memory,
            AgentKind::WebSearch => &self.config.web_search,
        }
    }

    async fn send_once(&self, task: &AgentTask) -> Result<Value, CallError> {
        let agent = task.agent();
        let endpoint = self.endpoint(agent);
        let url = format!("{}{}", endpoint.base_url.trim_end_matches('/'), task.path());
        let timeout = Duration::from_secs(endpoint.timeout_secs);

        let request = match task.method() {
            TaskMethod::Get => self.client.get(&url),
            TaskMethod::Post => {
                let body = task.body().unwrap_or_else(|| json!({}));
                self.client.post(&url).json(&body)
            }
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(
                status.as_u16(),
                format!("{} returned {}: {}", agent, status, truncate(&body, 300)),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CallError::validation(format!("invalid JSON from {}: {}", agent, e)))
    }
}

#[async_trait]
impl AgentDispatch for HttpAgentDispatcher {
    async fn execute(&self, correlation_id: &str, task: AgentTask) -> Result<Value, CallError> {
        let agent = task.agent();
        let breaker = self.breakers.breaker(&agent.to_string(), task.function());

        breaker.check()?;

        info!(
            correlation_id = %correlation_id,
            agent = %agent,
            function = %task.function(),
            "Executing agent task"
        );

        let result =
            retry_with_policy(&self.retry, correlation_id, || self.send_once(&task)).await;

        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    agent = %agent,
                    function = %task.function(),
                    error = %e,
                    "Agent task failed"
                );
                breaker.record_failure();
            }
        }

        result
    }

    async fn health_check(&self, agent: AgentKind) -> bool {
        let endpoint = self.endpoint(agent);
        let url = format!("{}/health", endpoint.base_url.trim_end_matches('/'));

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn map_reqwest_error(e: &reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::timeout(e.to_string())
    } else {
        CallError::connection(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload_shape() {
        let payload = failure_payload(AgentKind::Rag, &CallError::timeout("deadline elapsed"));

        assert_eq!(payload["success"], false);
        assert_eq!(payload["agent"], "rag");
        assert!(payload["error"].as_str().unwrap().contains("deadline"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
