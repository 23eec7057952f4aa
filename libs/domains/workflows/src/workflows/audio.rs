//! Audio processing workflow: transcribe, then hand off.
//!
//! This workflow produces no reply of its own; the worker re-enqueues the
//! message under the workflow named in `results.next_workflow` with the
//! transcribed text as content.

use crate::error::WorkflowError;
use crate::graph::NodeHandler;
use crate::state::WorkflowState;
use agent_client::{failure_payload, AgentDispatch, AgentKind, AgentTask};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Calls the transcription agent with the media URL from the context.
pub struct TranscribeNode {
    dispatch: Arc<dyn AgentDispatch>,
}

impl TranscribeNode {
    pub fn new(dispatch: Arc<dyn AgentDispatch>) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl NodeHandler for TranscribeNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let audio_url = state
            .context_str("audio_url")
            .or_else(|| state.context_str("file_url"))
            .map(str::to_string);

        let Some(audio_url) = audio_url else {
            state.fail("Transcription failed: missing audio_url");
            return Ok(state);
        };

        let task = AgentTask::TranscribeUrl {
            audio_url,
            content_type: state.context_str("content_type").map(str::to_string),
            language: Some(
                state
                    .context_str("language")
                    .unwrap_or("pt")
                    .to_string(),
            ),
            use_cache: true,
        };

        match self.dispatch.execute(&state.correlation_id, task).await {
            Ok(result) => {
                let text = result
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                info!(
                    conversation_key = %state.conversation_key,
                    chars = %text.chars().count(),
                    "Audio transcribed"
                );

                state.set_result("transcription", result);
                state
                    .context
                    .insert("transcribed_text".to_string(), json!(text));
                state.current_step = "transcribed".to_string();
            }
            Err(e) => {
                error!(
                    conversation_key = %state.conversation_key,
                    error = %e,
                    "Transcription failed"
                );
                state.set_result("transcription", failure_payload(AgentKind::Transcription, &e));
                state.fail(format!("Transcription failed: {}", e));
            }
        }

        Ok(state)
    }
}

/// Routes the transcribed text to the property search workflow.
pub struct RouteTranscriptionNode;

#[async_trait]
impl NodeHandler for RouteTranscriptionNode {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let transcribed = state
            .context_str("transcribed_text")
            .unwrap_or_default()
            .to_string();

        if !transcribed.is_empty() {
            state.set_result("next_workflow", json!("property_search_workflow"));
            state.set_result("processed_content", json!(transcribed));
        }

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

    fn state_with_audio() -> WorkflowState {
        let mut context = Map::new();
        context.insert("audio_url".to_string(), json!("https://cdn/voice.ogg"));
        context.insert("content_type".to_string(), json!("audio/ogg"));
        WorkflowState::new("I1:5511999999999", "5511999999999", "corr-1", context)
    }

    #[tokio::test]
    async fn test_transcribe_sets_text_in_context() {
        let dispatch = Arc::new(FakeDispatch::new().with_response(
            AgentKind::Transcription,
            "transcribe_url",
            json!({"text": "procuro casa de 3 quartos", "confidence": 0.95}),
        ));

        let node = TranscribeNode::new(dispatch);
        let state = node.run(state_with_audio()).await.unwrap();

        assert!(state.error.is_none());
        assert_eq!(
            state.context_str("transcribed_text"),
            Some("procuro casa de 3 quartos")
        );
        assert_eq!(state.current_step, "transcribed");
        assert_eq!(state.result("transcription").unwrap()["confidence"], 0.95);
    }

    #[tokio::test]
    async fn test_transcribe_without_url_fails_softly() {
        let dispatch = Arc::new(FakeDispatch::new());
        let node = TranscribeNode::new(dispatch);

        let state = node
            .run(WorkflowState::new("k", "u", "c", Map::new()))
            .await
            .unwrap();

        assert!(state.error.as_deref().unwrap().contains("audio_url"));
    }

    #[tokio::test]
    async fn test_transcribe_agent_error_fails_workflow() {
        let dispatch = Arc::new(FakeDispatch::new().with_error(
            AgentKind::Transcription,
            "transcribe_url",
            resilience::CallError::timeout("transcription timed out"),
        ));

        let node = TranscribeNode::new(dispatch);
        let state = node.run(state_with_audio()).await.unwrap();

        assert!(state.error.as_deref().unwrap().contains("Transcription failed"));
    }

    #[tokio::test]
    async fn test_route_hands_off_to_property_search() {
        let mut state = WorkflowState::new("k", "u", "c", Map::new());
        state
            .context
            .insert("transcribed_text".to_string(), json!("casa 3 quartos"));

        let state = RouteTranscriptionNode.run(state).await.unwrap();

        assert_eq!(
            state.result("next_workflow").unwrap(),
            "property_search_workflow"
        );
        assert_eq!(state.result("processed_content").unwrap(), "casa 3 quartos");
        assert_eq!(state.current_step, "completed");
    }

    #[tokio::test]
    async fn test_route_without_text_produces_no_handoff() {
        let state = RouteTranscriptionNode
            .run(WorkflowState::new("k", "u", "c", Map::new()))
            .await
            .unwrap();

        assert!(state.result("next_workflow").is_none());
        assert_eq!(state.current_step, "completed");
    }
}
