//! Greeting workflow: one node, personalized from memory.

use crate::error::WorkflowError;
use crate::graph::NodeHandler;
use crate::state::WorkflowState;
use crate::workflows::store_memory_best_effort;
use agent_client::{AgentDispatch, AgentTask, MemoryType};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

const HISTORY_MARKERS: &[&str] = &["busca", "imóvel", "propriedade"];

/// Greets the user, warmly when they have prior search history.
pub struct GreetNode {
    dispatch: Arc<dyn AgentDispatch>,
}

impl GreetNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>) -> Self {
        Self { dispatch }
    }

    /// Whether the user's memories mention prior property searches.
    pub(crate) fn has_search_history(user_context: &Value) -> bool {
        let memories = ["recent_memories", "important_memories"]
            .iter()
            .filter_map(|key| user_context.get(*key).and_then(Value::as_array))
            .flatten();

        for memory in memories {
            let content = memory
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            if HISTORY_MARKERS.iter().any(|marker| content.contains(marker)) {
                return true;
            }
        }
        false
    }

    pub(crate) fn returning_greeting() -> String {
        let mut greeting = String::from("Olá novamente! 👋\n\n");
        greeting.push_str("Vejo que você já conversou comigo antes sobre imóveis. ");
        greeting.push_str(
            "Como posso te ajudar hoje? Quer continuar uma busca anterior ou começar uma nova?\n\n",
        );
        greeting.push_str("O que você gostaria de fazer?");
        greeting
    }

    pub(crate) fn cold_greeting() -> String {
        let mut greeting = String::from("Olá! 👋\n\n");
        greeting.push_str("Sou seu assistente de imóveis em Uberlândia e região.\n\n");
        greeting.push_str("Como posso te ajudar hoje? Posso:\n");
        greeting.push_str("• 🏠 Buscar imóveis para compra ou aluguel\n");
        greeting.push_str("• 💰 Avaliar o valor de um imóvel\n");
        greeting.push_str("• 📋 Tirar dúvidas sobre documentação\n");
        greeting.push_str("• 📞 Conectar você com nossos corretores\n\n");
        greeting.push_str("O que você gostaria de fazer?");
        greeting
    }
}

#[async_trait]
impl NodeHandler for GreetNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let task = AgentTask::MemoryGetUserContext {
            user_id: state.user_id.clone(),
        };

        let greeting = match self.dispatch.execute(&state.correlation_id, task).await {
            Ok(user_context) => {
                let personalized = Self::has_search_history(&user_context);
                let greeting = if personalized {
                    Self::returning_greeting()
                } else {
                    Self::cold_greeting()
                };

                store_memory_best_effort(
                    &self.dispatch,
                    &state,
                    greeting.clone(),
                    MemoryType::ShortTerm,
                    json!({"workflow": "greeting", "personalized": personalized}),
                )
                .await;

                greeting
            }
            Err(e) => {
                // Memory being down must not silence the assistant
                warn!(error = %e, "Failed to fetch user context, using fallback greeting");
                "Olá! Como posso te ajudar hoje?".to_string()
            }
        };

        state.set_result("greeting", json!(greeting));
        state.current_step = "completed".to_string();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testing::FakeDispatch;
    use agent_client::AgentKind;
    use serde_json::Map;

    fn state() -> WorkflowState {
        let mut context = Map::new();
        context.insert("message_content".to_string(), json!("Olá"));
        WorkflowState::new("I1:5511999999999", "5511999999999", "corr-1", context)
    }

    #[test]
    fn test_history_detection() {
        assert!(GreetNode::has_search_history(&json!({
            "recent_memories": [{"content": "Busca por casa em Uberlândia"}]
        })));
        assert!(GreetNode::has_search_history(&json!({
            "important_memories": [{"content": "cliente interessado em imóvel no centro"}]
        })));
        assert!(!GreetNode::has_search_history(&json!({
            "recent_memories": [{"content": "perguntou sobre o tempo"}]
        })));
        assert!(!GreetNode::has_search_history(&json!({})));
    }

    #[tokio::test]
    async fn test_cold_greeting_for_new_user() {
        let dispatch = Arc::new(FakeDispatch::new().with_response(
            AgentKind::Memory,
            "get_user_context",
            json!({"recent_memories": []}),
        ));

        let state = GreetNode::new(dispatch).run(state()).await.unwrap();
        let greeting = state.result("greeting").unwrap().as_str().unwrap();

        assert!(greeting.contains("Olá"));
        assert!(greeting.contains("Buscar imóveis"));
        assert!(greeting.ends_with('?'));
    }

    #[tokio::test]
    async fn test_warm_greeting_for_returning_user() {
        let dispatch = Arc::new(FakeDispatch::new().with_response(
            AgentKind::Memory,
            "get_user_context",
            json!({"recent_memories": [{"content": "Busca por casa 3 quartos"}]}),
        ));

        let state = GreetNode::new(dispatch.clone()).run(state()).await.unwrap();
        let greeting = state.result("greeting").unwrap().as_str().unwrap();

        assert!(greeting.contains("Olá novamente"));
        assert!(greeting.ends_with('?'));

        // The greeting was stored back into memory
        assert!(dispatch
            .executed_functions()
            .contains(&"memory:store".to_string()));
    }

    #[tokio::test]
    async fn test_memory_failure_uses_fallback() {
        let dispatch = Arc::new(FakeDispatch::new().with_error(
            AgentKind::Memory,
            "get_user_context",
            resilience::CallError::connection("memory agent down"),
        ));

        let state = GreetNode::new(dispatch).run(state()).await.unwrap();
        let greeting = state.result("greeting").unwrap().as_str().unwrap();

        assert_eq!(greeting, "Olá! Como posso te ajudar hoje?");
        assert!(state.error.is_none());
    }
}
