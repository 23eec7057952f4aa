//! The shared state record threaded through workflow nodes.

use crate::llm::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value record passed between nodes.
///
/// The state is owned by one node at a time: the engine clones it for
/// concurrent siblings and merges their disjoint `results[node]` writes, so
/// nodes never observe each other's partial mutations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowState {
    /// Conversation transcript available to LLM-backed nodes.
    pub messages: Vec<ChatMessage>,
    /// Name of the most recent step, for progress reporting.
    pub current_step: String,
    /// `instance_id:phone` of the conversation being served.
    pub conversation_key: String,
    /// User identity handed to the memory agent.
    pub user_id: String,
    /// Correlation ID threaded into agent calls.
    pub correlation_id: String,
    /// Input context (message content, media URLs, prior user context).
    pub context: Map<String, Value>,
    /// Node outputs, keyed by node name or logical result slot.
    pub results: Map<String, Value>,
    /// Soft failure marker; a set error aborts the execution as failed.
    pub error: Option<String>,
}

impl WorkflowState {
    /// Build the initial state for one execution.
    pub fn new(
        conversation_key: impl Into<String>,
        user_id: impl Into<String>,
        correlation_id: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        Self {
            messages: Vec::new(),
            current_step: "start".to_string(),
            conversation_key: conversation_key.into(),
            user_id: user_id.into(),
            correlation_id: correlation_id.into(),
            context,
            results: Map::new(),
            error: None,
        }
    }

    /// The inbound message content, when present in the context.
    pub fn message_content(&self) -> &str {
        self.context
            .get("message_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Fetch a context value as a string.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Record a node result.
    pub fn set_result(&mut self, key: impl Into<String>, value: Value) {
        self.results.insert(key.into(), value);
    }

    /// Fetch a result value.
    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    /// Mark a soft failure; the engine turns this into a failed execution.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_accessors() {
        let mut context = Map::new();
        context.insert("message_content".to_string(), json!("Procuro casa"));

        let mut state = WorkflowState::new("I1:5511999999999", "5511999999999", "corr-1", context);

        assert_eq!(state.message_content(), "Procuro casa");
        assert_eq!(state.current_step, "start");
        assert!(state.error.is_none());

        state.set_result("greeting", json!("Olá!"));
        assert_eq!(state.result("greeting").unwrap(), "Olá!");

        state.fail("boom");
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_state_roundtrip() {
        let mut state = WorkflowState::new("k", "u", "c", Map::new());
        state.set_result("answer", json!({"text": "42"}));

        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();

        assert_eq!(back.conversation_key, "k");
        assert_eq!(back.result("answer").unwrap()["text"], "42");
    }
}
