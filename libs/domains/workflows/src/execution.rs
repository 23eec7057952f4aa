//! Workflow execution record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Terminal and in-flight execution states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One workflow run, owned by a single pipeline worker until terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub conversation_key: String,
    /// Input context snapshot.
    pub input: Map<String, Value>,
    pub status: WorkflowStatus,
    /// Node currently (or last) executing.
    pub current_node: String,
    /// Nodes that finished, in completion order.
    pub executed_nodes: Vec<String>,
    /// Outputs per node/result slot.
    pub node_outputs: Map<String, Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn start(
        workflow_name: impl Into<String>,
        conversation_key: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            conversation_key: conversation_key.into(),
            input,
            status: WorkflowStatus::Running,
            current_node: String::new(),
            executed_nodes: Vec::new(),
            node_outputs: Map::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = WorkflowStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = WorkflowStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = WorkflowStatus::Cancelled;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Extract the user-visible reply from the outputs, if any.
    ///
    /// Workflows publish their reply under different slots; the precedence
    /// mirrors how the assistant's responses are layered.
    pub fn reply(&self) -> Option<&str> {
        ["formatted_response", "greeting", "answer", "response"]
            .iter()
            .find_map(|key| self.node_outputs.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// The follow-up workflow requested by this execution, if any.
    pub fn next_workflow(&self) -> Option<&str> {
        self.node_outputs
            .get("next_workflow")
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle() {
        let mut execution = WorkflowExecution::start("greeting_workflow", "I1:55119", Map::new());
        assert_eq!(execution.status, WorkflowStatus::Running);
        assert!(!execution.status.is_terminal());
        assert!(execution.finished_at.is_none());

        execution.complete();
        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert!(execution.status.is_terminal());
        assert!(execution.finished_at.is_some());
    }

    #[test]
    fn test_failed_execution_records_error() {
        let mut execution = WorkflowExecution::start("w", "k", Map::new());
        execution.fail("transcription failed");

        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert_eq!(execution.error.as_deref(), Some("transcription failed"));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut execution = WorkflowExecution::start("w", "k", Map::new());
        execution.cancel("deadline elapsed");
        assert_eq!(execution.status, WorkflowStatus::Cancelled);
        assert!(execution.status.is_terminal());
    }

    #[test]
    fn test_reply_precedence() {
        let mut execution = WorkflowExecution::start("w", "k", Map::new());
        execution
            .node_outputs
            .insert("response".to_string(), json!("generic"));
        execution
            .node_outputs
            .insert("answer".to_string(), json!("the answer"));
        assert_eq!(execution.reply(), Some("the answer"));

        execution
            .node_outputs
            .insert("formatted_response".to_string(), json!("formatted"));
        assert_eq!(execution.reply(), Some("formatted"));
    }

    #[test]
    fn test_reply_ignores_empty_strings() {
        let mut execution = WorkflowExecution::start("w", "k", Map::new());
        execution
            .node_outputs
            .insert("greeting".to_string(), json!(""));
        assert_eq!(execution.reply(), None);
    }

    #[test]
    fn test_next_workflow() {
        let mut execution = WorkflowExecution::start("audio_processing_workflow", "k", Map::new());
        assert!(execution.next_workflow().is_none());

        execution
            .node_outputs
            .insert("next_workflow".to_string(), json!("property_search_workflow"));
        assert_eq!(execution.next_workflow(), Some("property_search_workflow"));
    }
}
