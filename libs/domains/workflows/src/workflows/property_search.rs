//! Property search workflow: extract criteria, search, format.

use crate::error::WorkflowError;
use crate::graph::NodeHandler;
use crate::llm::{ChatMessage, ChatModel};
use crate::state::WorkflowState;
use crate::workflows::store_memory_best_effort;
use agent_client::{AgentDispatch, AgentTask, MemoryType, SearchCriteria};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Extracts structured search criteria from the message via the LLM.
///
/// The LLM is asked for JSON; the reply is parsed and any parse failure
/// falls back to empty criteria instead of failing the workflow.
pub struct ExtractCriteriaNode {
    llm: Arc<dyn ChatModel>,
}

impl ExtractCriteriaNode {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Pull the first JSON object out of an LLM reply and deserialize it.
    pub(crate) fn parse_criteria(reply: &str) -> SearchCriteria {
        let Some(start) = reply.find('{') else {
            return SearchCriteria::default();
        };
        let Some(end) = reply.rfind('}') else {
            return SearchCriteria::default();
        };
        if end < start {
            return SearchCriteria::default();
        }

        serde_json::from_str(&reply[start..=end]).unwrap_or_else(|e| {
            warn!(error = %e, "Criteria JSON did not parse, using empty criteria");
            SearchCriteria::default()
        })
    }
}

#[async_trait]
impl NodeHandler for ExtractCriteriaNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let content = state.message_content().to_string();

        let prompt = format!(
            "Extraia os critérios de busca de imóvel desta mensagem: \"{}\"\n\n\
             Responda APENAS com um objeto JSON com os campos:\n\
             property_type, location, price_min, price_max, bedrooms, bathrooms, \
             area_min, area_max, features (lista).\n\
             Use null para campos não mencionados.",
            content
        );

        match self
            .llm
            .chat(&[ChatMessage::user(prompt)], Some(0.1))
            .await
        {
            Ok(reply) => {
                let criteria = Self::parse_criteria(&reply);
                state.set_result(
                    "search_criteria",
                    serde_json::to_value(&criteria).unwrap_or_else(|_| json!({})),
                );
                state.current_step = "criteria_extracted".to_string();
            }
            Err(e) => {
                error!(error = %e, "Failed to extract criteria");
                state.fail(format!("Failed to extract search criteria: {}", e));
            }
        }

        Ok(state)
    }
}

/// Calls the web search agent with the extracted criteria.
pub struct SearchPropertiesNode {
    dispatch: Arc<dyn AgentDispatch>,
}

impl SearchPropertiesNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl NodeHandler for SearchPropertiesNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let criteria: SearchCriteria = state
            .result("search_criteria")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let task = AgentTask::PropertySearch { criteria };

        match self.dispatch.execute(&state.correlation_id, task).await {
            Ok(result) => {
                // Agents answer with either {properties: [...]} or {results: [...]}
                let properties = result
                    .get("properties")
                    .or_else(|| result.get("results"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                state.set_result("properties", Value::Array(properties));
                state.current_step = "properties_found".to_string();
            }
            Err(e) => {
                error!(error = %e, "Property search failed");
                state.fail(format!("Property search failed: {}", e));
            }
        }

        Ok(state)
    }
}

/// Renders the top results into a WhatsApp-friendly reply and records the
/// search outcome in memory.
pub struct FormatRepliesNode {
    dispatch: Arc<dyn AgentDispatch>,
}

impl FormatRepliesNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>) -> Self {
        Self { dispatch }
    }

    fn display(value: Option<&Value>, fallback: &str) -> String {
        match value {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub(crate) fn format_properties(properties: &[Value]) -> String {
        let mut reply = format!(
            "Encontrei {} imóveis que podem te interessar:\n\n",
            properties.len()
        );

        for (i, property) in properties.iter().take(5).enumerate() {
            reply.push_str(&format!(
                "{}. {}\n",
                i + 1,
                Self::display(property.get("title"), "Imóvel")
            ));
            reply.push_str(&format!(
                "   💰 {}\n",
                Self::display(property.get("price"), "Preço não informado")
            ));
            reply.push_str(&format!(
                "   📍 {}\n",
                Self::display(property.get("location"), "Localização não informada")
            ));
            reply.push_str(&format!(
                "   🏠 {} quartos, {} banheiros\n\n",
                Self::display(property.get("bedrooms"), "?"),
                Self::display(property.get("bathrooms"), "?")
            ));
        }

        reply.push_str("Gostaria de mais detalhes sobre algum destes imóveis?");
        reply
    }
}

#[async_trait]
impl NodeHandler for FormatRepliesNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let properties = state
            .result("properties")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let criteria = state
            .result("search_criteria")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let (reply, success, importance) = if properties.is_empty() {
            (
                "Não encontrei imóveis com os critérios informados. Pode tentar uma busca diferente?"
                    .to_string(),
                false,
                0.4,
            )
        } else {
            (Self::format_properties(&properties), true, 0.8)
        };

        // Record the search outcome; successful searches matter more for
        // future personalization
        let summary = format!(
            "Busca por {} em {}. Encontrados {} resultados.",
            criteria
                .get("property_type")
                .and_then(Value::as_str)
                .unwrap_or("imóvel"),
            criteria
                .get("location")
                .and_then(Value::as_str)
                .unwrap_or("localização não especificada"),
            properties.len()
        );
        store_memory_best_effort(
            &self.dispatch,
            &state,
            summary,
            MemoryType::LongTerm,
            json!({
                "workflow": "property_search",
                "criteria": criteria,
                "results_count": properties.len(),
                "success": success,
                "importance_score": importance,
            }),
        )
        .await;

        store_memory_best_effort(
            &self.dispatch,
            &state,
            reply.clone(),
            MemoryType::ShortTerm,
            json!({"workflow": "property_search", "is_response": true}),
        )
        .await;

        state.set_result("formatted_response", json!(reply));
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

    fn state_with_content(content: &str) -> WorkflowState {
        let mut context = Map::new();
        context.insert("message_content".to_string(), json!(content));
        WorkflowState::new("I1:5511999999999", "5511999999999", "corr-1", context)
    }

    #[test]
    fn test_parse_criteria_from_clean_json() {
        let criteria = ExtractCriteriaNode::parse_criteria(
            r#"{"property_type": "casa", "location": "Uberlândia", "bedrooms": 3, "price_max": 500000}"#,
        );
        assert_eq!(criteria.property_type.as_deref(), Some("casa"));
        assert_eq!(criteria.bedrooms, Some(3));
        assert_eq!(criteria.price_max, Some(500_000.0));
    }

    #[test]
    fn test_parse_criteria_from_wrapped_json() {
        let criteria = ExtractCriteriaNode::parse_criteria(
            "Aqui estão os critérios:\n```json\n{\"property_type\": \"apartamento\"}\n```\nEspero ter ajudado.",
        );
        assert_eq!(criteria.property_type.as_deref(), Some("apartamento"));
    }

    #[test]
    fn test_parse_criteria_falls_back_to_empty() {
        assert_eq!(
            ExtractCriteriaNode::parse_criteria("não consegui entender"),
            SearchCriteria::default()
        );
        assert_eq!(
            ExtractCriteriaNode::parse_criteria("{broken json"),
            SearchCriteria::default()
        );
        assert_eq!(ExtractCriteriaNode::parse_criteria(""), SearchCriteria::default());
    }

    #[tokio::test]
    async fn test_search_accepts_properties_shape() {
        let dispatch = Arc::new(FakeDispatch::new().with_response(
            AgentKind::WebSearch,
            "search",
            json!({"properties": [{"title": "Casa X"}]}),
        ));

        let mut state = state_with_content("casa");
        state.set_result("search_criteria", json!({}));

        let state = SearchPropertiesNode::new(dispatch).run(state).await.unwrap();
        let properties = state.result("properties").unwrap().as_array().unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(state.current_step, "properties_found");
    }

    #[tokio::test]
    async fn test_search_accepts_results_shape() {
        let dispatch = Arc::new(FakeDispatch::new().with_response(
            AgentKind::WebSearch,
            "search",
            json!({"results": [{"title": "Casa Y"}, {"title": "Casa Z"}]}),
        ));

        let mut state = state_with_content("casa");
        state.set_result("search_criteria", json!({}));

        let state = SearchPropertiesNode::new(dispatch).run(state).await.unwrap();
        assert_eq!(
            state.result("properties").unwrap().as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_search_failure_marks_error() {
        let dispatch = Arc::new(FakeDispatch::new().with_error(
            AgentKind::WebSearch,
            "search",
            resilience::CallError::connection("refused"),
        ));

        let mut state = state_with_content("casa");
        state.set_result("search_criteria", json!({}));

        let state = SearchPropertiesNode::new(dispatch).run(state).await.unwrap();
        assert!(state.error.as_deref().unwrap().contains("Property search failed"));
    }

    #[test]
    fn test_format_top_five_with_details() {
        let properties: Vec<Value> = (0..7)
            .map(|i| {
                json!({
                    "title": format!("Casa {}", i),
                    "price": "R$ 450.000",
                    "location": "Santa Mônica, Uberlândia/MG",
                    "bedrooms": 3,
                    "bathrooms": 2
                })
            })
            .collect();

        let reply = FormatRepliesNode::format_properties(&properties);

        assert!(reply.contains("1. Casa 0"));
        assert!(reply.contains("5. Casa 4"));
        // Only the top 5 are shown
        assert!(!reply.contains("6. Casa 5"));
        assert!(reply.contains("R$ 450.000"));
        assert!(reply.contains("3 quartos"));
        assert!(reply.contains("2 banheiros"));
        assert!(reply.ends_with('?'));
    }

    #[tokio::test]
    async fn test_format_reply_happy_path() {
        let dispatch = Arc::new(FakeDispatch::new());
        let mut state = state_with_content("Procuro casa 3 quartos em Uberlândia até 500000");
        state.set_result("search_criteria", json!({"property_type": "casa"}));
        state.set_result(
            "properties",
            json!([{
                "title": "Casa X",
                "price": "R$ 450.000",
                "location": "Santa Mônica, Uberlândia/MG",
                "bedrooms": 3,
                "bathrooms": 2
            }]),
        );

        let state = FormatRepliesNode::new(dispatch.clone())
            .run(state)
            .await
            .unwrap();

        let reply = state
            .result("formatted_response")
            .unwrap()
            .as_str()
            .unwrap();
        assert!(reply.contains("1."));
        assert!(reply.contains("Casa X"));
        assert!(reply.contains("R$ 450.000"));
        assert!(reply.contains("3 quartos"));
        assert!(reply.contains("2 banheiros"));
        assert!(reply.ends_with('?'));

        // Search outcome and reply were both remembered
        let stored = dispatch.executed_functions();
        assert_eq!(stored.iter().filter(|f| *f == "memory:store").count(), 2);
    }

    #[tokio::test]
    async fn test_format_reply_no_results() {
        let dispatch = Arc::new(FakeDispatch::new());
        let mut state = state_with_content("Procuro mansão de 40 quartos");
        state.set_result("search_criteria", json!({}));
        state.set_result("properties", json!([]));

        let state = FormatRepliesNode::new(dispatch).run(state).await.unwrap();

        let reply = state
            .result("formatted_response")
            .unwrap()
            .as_str()
            .unwrap();
        assert!(reply.contains("Não encontrei imóveis"));
        assert!(reply.ends_with('?'));
    }
}
