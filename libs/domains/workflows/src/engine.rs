//! The workflow executor.

use crate::checkpoint::{Checkpoint, CheckpointSink, NoopCheckpointSink};
use crate::error::WorkflowError;
use crate::execution::{WorkflowExecution, WorkflowStatus};
use crate::graph::WorkflowDefinition;
use crate::state::WorkflowState;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Executes registered workflow definitions.
///
/// Definitions are compiled at registration; execution walks the
/// topological ranks, running same-rank nodes concurrently. The engine
/// enforces the caller's deadline between and across ranks: an elapsed
/// deadline cancels outstanding node calls cooperatively and the execution
/// surfaces as `cancelled` (never retried).
pub struct WorkflowEngine {
    workflows: HashMap<String, WorkflowDefinition>,
    checkpoints: Arc<dyn CheckpointSink>,
}

impl WorkflowEngine {
    /// Register a set of workflow definitions.
    pub fn new(definitions: Vec<WorkflowDefinition>) -> Self {
        let mut workflows = HashMap::new();
        for definition in definitions {
            info!(
                workflow = %definition.name,
                nodes = %definition.len(),
                "Registered workflow"
            );
            workflows.insert(definition.name.clone(), definition);
        }

        Self {
            workflows,
            checkpoints: Arc::new(NoopCheckpointSink),
        }
    }

    /// Attach a checkpoint sink.
    pub fn with_checkpoint_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.checkpoints = sink;
        self
    }

    /// Names of the registered workflows.
    pub fn workflow_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn has_workflow(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Execute a workflow under a deadline.
    pub async fn execute(
        &self,
        workflow_name: &str,
        state: WorkflowState,
        deadline: Duration,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let definition = self
            .workflows
            .get(workflow_name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(workflow_name.to_string()))?;

        let mut execution = WorkflowExecution::start(
            workflow_name,
            state.conversation_key.clone(),
            state.context.clone(),
        );
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut state = state;

        for rank in definition.ranks() {
            let Some(remaining) = deadline_at.checked_duration_since(Instant::now()) else {
                warn!(
                    workflow = %workflow_name,
                    execution_id = %execution.execution_id,
                    "Deadline elapsed before rank start"
                );
                execution.cancel("execution deadline elapsed");
                return Ok(execution);
            };

            execution.current_node = rank.join("+");

            let rank_result =
                tokio::time::timeout(remaining, self.run_rank(definition, rank, state)).await;

            state = match rank_result {
                Ok(Ok(next_state)) => next_state,
                Ok(Err(e)) => {
                    execution.fail(e.to_string());
                    return Ok(execution);
                }
                Err(_) => {
                    warn!(
                        workflow = %workflow_name,
                        execution_id = %execution.execution_id,
                        rank = ?rank,
                        "Deadline elapsed mid-rank, cancelling"
                    );
                    execution.cancel("execution deadline elapsed");
                    return Ok(execution);
                }
            };

            for node in rank {
                execution.executed_nodes.push(node.clone());
                self.checkpoints
                    .record(Checkpoint {
                        execution_id: execution.execution_id,
                        workflow_name: workflow_name.to_string(),
                        node: node.clone(),
                        output: state.results.get(node.as_str()).cloned().unwrap_or(Value::Null),
                    })
                    .await;
            }

            if let Some(error) = state.error.clone() {
                execution.node_outputs = state.results.clone();
                execution.fail(error);
                return Ok(execution);
            }
        }

        execution.current_node = state.current_step.clone();
        execution.node_outputs = state.results.clone();
        execution.complete();

        info!(
            workflow = %workflow_name,
            execution_id = %execution.execution_id,
            status = ?execution.status,
            nodes = %execution.executed_nodes.len(),
            elapsed_ms = %started.elapsed().as_millis(),
            "Workflow executed"
        );

        Ok(execution)
    }

    /// Run one rank: a single node runs in place, siblings run concurrently
    /// on cloned states and their disjoint `results` writes are merged.
    async fn run_rank(
        &self,
        definition: &WorkflowDefinition,
        rank: &[String],
        state: WorkflowState,
    ) -> Result<WorkflowState, WorkflowError> {
        if rank.len() == 1 {
            let handler = definition
                .handler(&rank[0])
                .expect("ranks only contain registered nodes");
            return handler.run(state).await;
        }

        let futures: Vec<_> = rank
            .iter()
            .map(|node| {
                let handler = definition
                    .handler(node)
                    .expect("ranks only contain registered nodes");
                let branch_state = state.clone();
                async move { handler.run(branch_state).await }
            })
            .collect();

        let outcomes = join_all(futures).await;

        let mut merged = state;
        for (node, outcome) in rank.iter().zip(outcomes) {
            let branch = outcome?;

            for (key, value) in branch.results {
                merged.results.entry(key).or_insert(value);
            }
            for (key, value) in branch.context {
                merged.context.entry(key).or_insert(value);
            }
            if merged.error.is_none() {
                merged.error = branch.error;
            }
            merged.current_step = node.clone();
        }

        Ok(merged)
    }
}
