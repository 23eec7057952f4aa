//! General conversation workflow: a bounded LLM reply with domain framing.

use crate::error::WorkflowError;
use crate::graph::NodeHandler;
use crate::llm::{ChatMessage, ChatModel};
use crate::state::WorkflowState;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Answers anything that matched no other intent, steering the conversation
/// back to real estate.
pub struct LlmReplyNode {
    llm: Arc<dyn ChatModel>,
}

impl LlmReplyNode {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NodeHandler for LlmReplyNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let content = state.message_content().to_string();

        let messages = [
            ChatMessage::system(
                "Você é um assistente especializado em imóveis de Uberlândia/MG. \
                 Responda de forma amigável e direcione a conversa para como você \
                 pode ajudar com imóveis.",
            ),
            ChatMessage::user(content),
        ];

        let reply = match self.llm.chat(&messages, None).await {
            Ok(reply) => reply,
            Err(e) => {
                // Safe fallback: never leave the user without a reply
                error!(error = %e, "Response generation failed");
                "Como posso te ajudar com imóveis hoje?".to_string()
            }
        };

        state.set_result("response", json!(reply));
        state.current_step = "completed".to_string();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EchoModel;
    use resilience::CallError;
    use serde_json::Map;

    struct BrokenModel;

    #[async_trait]
    impl ChatModel for BrokenModel {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: Option<f32>,
        ) -> Result<String, CallError> {
            Err(CallError::external("provider down"))
        }
    }

    fn state() -> WorkflowState {
        let mut context = Map::new();
        context.insert("message_content".to_string(), json!("conta uma piada"));
        WorkflowState::new("I1:5511999999999", "5511999999999", "corr-1", context)
    }

    #[tokio::test]
    async fn test_reply_comes_from_model() {
        let state = LlmReplyNode::new(Arc::new(EchoModel))
            .run(state())
            .await
            .unwrap();

        let reply = state.result("response").unwrap().as_str().unwrap();
        assert!(reply.contains("conta uma piada"));
        assert_eq!(state.current_step, "completed");
    }

    #[tokio::test]
    async fn test_provider_failure_uses_safe_fallback() {
        let state = LlmReplyNode::new(Arc::new(BrokenModel))
            .run(state())
            .await
            .unwrap();

        assert_eq!(
            state.result("response").unwrap(),
            "Como posso te ajudar com imóveis hoje?"
        );
        assert!(state.error.is_none());
    }
}
