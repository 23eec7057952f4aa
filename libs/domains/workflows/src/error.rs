use resilience::CallError;
use thiserror::Error;

/// Errors raised by workflow registration and execution.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No workflow registered under this name.
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// The graph descriptor is malformed (cycle, unknown node, bad entry).
    #[error("Invalid workflow graph '{workflow}': {details}")]
    InvalidGraph { workflow: String, details: String },

    /// A node failed hard (soft failures set `state.error` instead).
    #[error("Node '{node}' failed: {details}")]
    NodeFailed { node: String, details: String },

    /// An agent call failed terminally inside a node.
    #[error("Agent call failed: {0}")]
    Agent(#[from] CallError),

    /// The execution deadline elapsed.
    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    /// State (de)serialization failed.
    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::UnknownWorkflow("nope_workflow".to_string());
        assert_eq!(err.to_string(), "Unknown workflow: nope_workflow");

        let err = WorkflowError::InvalidGraph {
            workflow: "w".to_string(),
            details: "cycle detected".to_string(),
        };
        assert!(err.to_string().contains("cycle detected"));
    }
}
