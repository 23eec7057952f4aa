//! Question answering workflow: retrieve knowledge, then answer.

use crate::error::WorkflowError;
use crate::graph::NodeHandler;
use crate::llm::{ChatMessage, ChatModel};
use crate::state::WorkflowState;
use crate::workflows::store_memory_best_effort;
use agent_client::{failure_payload, AgentDispatch, AgentKind, AgentTask, MemoryType};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Retrieves domain knowledge (RAG) and the user's relevant memories.
///
/// The two lookups are independent and run concurrently. RAG is the
/// authoritative source: its failure fails the node; memory is garnish and
/// degrades to an empty list.
pub struct RetrieveNode {
    dispatch: Arc<dyn AgentDispatch>,
}

impl RetrieveNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl NodeHandler for RetrieveNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let question = state.message_content().to_string();

        let rag_task = AgentTask::rag_query(&question);
        let memory_task = AgentTask::memory_search(&state.user_id, &question);

        let (rag_result, memory_result) = tokio::join!(
            self.dispatch.execute(&state.correlation_id, rag_task),
            self.dispatch.execute(&state.correlation_id, memory_task),
        );

        let memories = match memory_result {
            Ok(value) => value
                .get("memories")
                .or(Some(&value))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Memory search failed, continuing without memories");
                Vec::new()
            }
        };

        match rag_result {
            Ok(rag_response) => {
                let sources = rag_response
                    .get("sources")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                state.set_result("rag_response", rag_response);
                state.set_result("sources", Value::Array(sources.clone()));
                state.set_result("retrieved_docs", Value::Array(sources));
                state.set_result("memory_context", Value::Array(memories));
                state.current_step = "knowledge_retrieved".to_string();
            }
            Err(e) => {
                error!(error = %e, "Knowledge retrieval failed");
                state.set_result("rag_response", failure_payload(AgentKind::Rag, &e));
                state.fail(format!("Knowledge retrieval failed: {}", e));
            }
        }

        Ok(state)
    }
}

/// Builds the final answer from the retrieved knowledge.
pub struct AnswerNode {
    dispatch: Arc<dyn AgentDispatch>,
    llm: Arc<dyn ChatModel>,
}

impl AnswerNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>, llm: Arc<dyn ChatModel>) -> Self {
        Self { dispatch, llm }
    }

    /// Append the relevant memories (similarity > 0.7, top 2) and cited
    /// sources (top 3) to a generated answer.
    pub(crate) fn decorate_answer(
        generated: &str,
        memories: &[Value],
        sources: &[Value],
    ) -> String {
        let mut formatted = generated.to_string();

        let relevant: Vec<&Value> = memories
            .iter()
            .filter(|m| {
                m.get("similarity_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0)
                    > 0.7
            })
            .take(2)
            .collect();
        if !relevant.is_empty() {
            formatted.push_str("\n\n📋 Com base em nossas conversas anteriores:\n");
            for memory in relevant {
                let content = memory
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let truncated: String = content.chars().take(200).collect();
                if truncated.chars().count() < content.chars().count() {
                    formatted.push_str(&format!("• {}...\n", truncated));
                } else {
                    formatted.push_str(&format!("• {}\n", truncated));
                }
            }
        }

        if !sources.is_empty() {
            formatted.push_str("\n\nFontes:\n");
            for source in sources.iter().take(3) {
                let title = source
                    .get("document_title")
                    .or_else(|| source.get("chunk_id"))
                    .and_then(Value::as_str)
                    .unwrap_or("fonte");
                match source.get("similarity_score").and_then(Value::as_f64) {
                    Some(score) => {
                        formatted.push_str(&format!("- {} (similaridade {:.2})\n", title, score))
                    }
                    None => formatted.push_str(&format!("- {}\n", title)),
                }
            }
        }

        formatted
    }
}

#[async_trait]
impl NodeHandler for AnswerNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let question = state.message_content().to_string();
        let rag_response = state.result("rag_response").cloned().unwrap_or(Value::Null);
        let memories = state
            .result("memory_context")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let sources = state
            .result("sources")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let generated = rag_response
            .get("generated_response")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let (answer, formatted) = match generated {
            // Prefer the RAG agent's generated answer
            Some(generated) => {
                let formatted = Self::decorate_answer(&generated, &memories, &sources);
                (generated, formatted)
            }
            // Otherwise compose one with the LLM over the combined context
            None => {
                let docs_context: String = sources
                    .iter()
                    .filter_map(|doc| doc.get("content").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");
                let memory_context: String = memories
                    .iter()
                    .take(3)
                    .filter_map(|m| m.get("content").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");

                let prompt = format!(
                    "Baseado no contexto abaixo, responda a pergunta sobre imóveis:\n\n\
                     Contexto:\n{}\n\n\
                     Contexto das conversas anteriores:\n{}\n\n\
                     Pergunta: {}\n\n\
                     Responda de forma clara e útil, focando no mercado imobiliário de \
                     Uberlândia/MG.",
                    docs_context, memory_context, question
                );

                match self.llm.chat(&[ChatMessage::user(prompt)], None).await {
                    Ok(reply) => (reply.clone(), reply),
                    Err(e) => {
                        error!(error = %e, "Answer generation failed");
                        let fallback =
                            "Desculpe, não consegui processar sua pergunta no momento.".to_string();
                        (fallback.clone(), fallback)
                    }
                }
            }
        };

        // Remember the interaction and the answer itself
        let qa_summary = format!(
            "Pergunta: {}... Respondido com base em {} fontes e {} memórias.",
            question.chars().take(200).collect::<String>(),
            sources.len(),
            memories.len()
        );
        store_memory_best_effort(
            &self.dispatch,
            &state,
            qa_summary,
            MemoryType::LongTerm,
            json!({
                "workflow": "question_answering",
                "sources_count": sources.len(),
                "memory_context_count": memories.len(),
                "question": question,
                "importance_score": 0.6,
            }),
        )
        .await;
        store_memory_best_effort(
            &self.dispatch,
            &state,
            formatted.clone(),
            MemoryType::ShortTerm,
            json!({"workflow": "question_answering", "is_response": true}),
        )
        .await;

        state.set_result("answer", json!(answer));
        state.set_result("formatted_response", json!(formatted));
        state.current_step = "completed".to_string();
        Ok(state)
    }
}
