//! Typed HTTP client for the backend agent fleet.
//!
//! Each agent exposes a narrow capability (transcription, RAG, memory, web
//! search); requests are expressed as tagged [`AgentTask`] variants so the
//! shape of every call is validated at the boundary instead of flowing
//! through free-form maps. Every call is wrapped by a per-(agent, function)
//! circuit breaker and a bounded retry policy.

mod dispatcher;
mod task;

pub use dispatcher::{failure_payload, AgentDispatch, HttpAgentDispatcher};
pub use task::{AgentKind, AgentTask, MemoryType, SearchCriteria};
