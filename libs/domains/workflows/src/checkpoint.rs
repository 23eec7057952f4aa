//! Optional checkpointing hook.
//!
//! After each node the engine may emit a checkpoint; implementations can
//! persist them to resume executions after a crash. The default sink drops
//! checkpoints; executions still record `executed_nodes` and
//! `node_outputs` on the execution record itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One per-node checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub node: String,
    pub output: Value,
}

/// Checkpoint persistence hook.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn record(&self, checkpoint: Checkpoint);
}

/// Drops all checkpoints.
#[derive(Default)]
pub struct NoopCheckpointSink;

#[async_trait]
impl CheckpointSink for NoopCheckpointSink {
    async fn record(&self, _checkpoint: Checkpoint) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink_accepts_checkpoints() {
        let sink = NoopCheckpointSink;
        sink.record(Checkpoint {
            execution_id: Uuid::new_v4(),
            workflow_name: "greeting_workflow".to_string(),
            node: "greet".to_string(),
            output: serde_json::json!({"greeting": "Olá"}),
        })
        .await;
    }
}
