//! Workflow engine: named DAGs of typed nodes over a shared state record.
//!
//! A workflow is a static graph descriptor, `{name, nodes, edges, entry}`,
//! registered at worker startup and compiled once into topological ranks.
//! The engine executes ranks in order; nodes sharing a rank run concurrently
//! and write to disjoint `results[node]` slots. A node that sets `error`
//! aborts the execution as `failed`; an elapsed deadline cancels outstanding
//! node calls cooperatively and surfaces `cancelled`.
//!
//! Five built-in workflows cover the assistant's conversation surface:
//! audio processing, property search, greeting, question answering and
//! general conversation.

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod execution;
pub mod graph;
pub mod intent;
pub mod llm;
pub mod state;
pub mod workflows;

pub use checkpoint::{Checkpoint, CheckpointSink, NoopCheckpointSink};
pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use execution::{WorkflowExecution, WorkflowStatus};
pub use graph::{EdgeDef, NodeDef, NodeHandler, WorkflowDefinition};
pub use intent::{classify_intent, workflow_for, Intent};
pub use llm::{ChatMessage, ChatModel, ChatRole, EchoModel, HttpChatModel};
pub use state::WorkflowState;
pub use workflows::build_registry;
