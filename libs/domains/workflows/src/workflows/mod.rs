//! The built-in workflow registry.
//!
//! Five workflows cover the assistant's conversation surface. Each is a
//! small static DAG; nodes hold their dependencies (agent dispatcher, chat
//! model) behind trait objects so tests inject fakes.

mod audio;
mod general;
mod greeting;
mod property_search;
mod question_answering;

pub use audio::{RouteTranscriptionNode, TranscribeNode};
pub use general::LlmReplyNode;
pub use greeting::GreetNode;
pub use property_search::{ExtractCriteriaNode, FormatRepliesNode, SearchPropertiesNode};
pub use question_answering::{AnswerNode, RetrieveNode};

use crate::error::WorkflowError;
use crate::graph::{EdgeDef, NodeDef, WorkflowDefinition};
use crate::llm::ChatModel;
use crate::state::WorkflowState;
use agent_client::{AgentDispatch, AgentTask, MemoryType};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Build all five workflow definitions.
pub fn build_registry(
    dispatch: Arc<dyn AgentDispatch>,
    llm: Arc<dyn ChatModel>,
) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
    let audio = WorkflowDefinition::new(
        "audio_processing_workflow",
        vec![
            NodeDef::new("transcribe", Arc::new(TranscribeNode::new(dispatch.clone()))),
            NodeDef::new("route", Arc::new(RouteTranscriptionNode)),
        ],
        vec![EdgeDef::new("transcribe", "route")],
        "transcribe",
    )?;

    let property_search = WorkflowDefinition::new(
        "property_search_workflow",
        vec![
            NodeDef::new(
                "extract_criteria",
                Arc::new(ExtractCriteriaNode::new(llm.clone())),
            ),
            NodeDef::new(
                "search_properties",
                Arc::new(SearchPropertiesNode::new(dispatch.clone())),
            ),
            NodeDef::new(
                "format_reply",
                Arc::new(FormatRepliesNode::new(dispatch.clone())),
            ),
        ],
        vec![
            EdgeDef::new("extract_criteria", "search_properties"),
            EdgeDef::new("search_properties", "format_reply"),
        ],
        "extract_criteria",
    )?;

    let greeting = WorkflowDefinition::new(
        "greeting_workflow",
        vec![NodeDef::new(
            "greet",
            Arc::new(GreetNode::new(dispatch.clone())),
        )],
        vec![],
        "greet",
    )?;

    let question_answering = WorkflowDefinition::new(
        "question_answering_workflow",
        vec![
            NodeDef::new("retrieve", Arc::new(RetrieveNode::new(dispatch.clone()))),
            NodeDef::new(
                "answer",
                Arc::new(AnswerNode::new(dispatch.clone(), llm.clone())),
            ),
        ],
        vec![EdgeDef::new("retrieve", "answer")],
        "retrieve",
    )?;

    let general = WorkflowDefinition::new(
        "general_conversation_workflow",
        vec![NodeDef::new("llm_reply", Arc::new(LlmReplyNode::new(llm)))],
        vec![],
        "llm_reply",
    )?;

    Ok(vec![
        audio,
        property_search,
        greeting,
        question_answering,
        general,
    ])
}

/// Store a memory item, swallowing failures.
///
/// Memory writes enrich future conversations; losing one never fails the
/// workflow that produced it.
pub(crate) async fn store_memory_best_effort(
    dispatch: &Arc<dyn AgentDispatch>,
    state: &WorkflowState,
    content: String,
    memory_type: MemoryType,
    metadata: Value,
) {
    let task = AgentTask::MemoryStore {
        user_id: state.user_id.clone(),
        conversation_id: state.conversation_key.clone(),
        content,
        memory_type,
        metadata,
    };

    if let Err(e) = dispatch.execute(&state.correlation_id, task).await {
        debug!(
            correlation_id = %state.correlation_id,
            error = %e,
            "Memory store failed (ignored)"
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDispatch;
    use super::*;
    use crate::llm::EchoModel;

    #[test]
    fn test_registry_contains_all_five_workflows() {
        let dispatch: Arc<dyn AgentDispatch> = Arc::new(FakeDispatch::new());
        let definitions = build_registry(dispatch, Arc::new(EchoModel)).unwrap();

        let mut names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "audio_processing_workflow",
                "general_conversation_workflow",
                "greeting_workflow",
                "property_search_workflow",
                "question_answering_workflow",
            ]
        );
    }

    #[test]
    fn test_property_search_is_three_sequential_nodes() {
        let dispatch: Arc<dyn AgentDispatch> = Arc::new(FakeDispatch::new());
        let definitions = build_registry(dispatch, Arc::new(EchoModel)).unwrap();
        let property = definitions
            .iter()
            .find(|d| d.name == "property_search_workflow")
            .unwrap();

        assert_eq!(
            property.ranks(),
            &[
                vec!["extract_criteria"],
                vec!["search_properties"],
                vec!["format_reply"]
            ]
        );
    }
}
