//! Application state management.
//!
//! This module defines the shared application state passed to all request
//! handlers. The state contains the composition root's long-lived pieces:
//! configuration, the Redis connection, the stream producer, the
//! conversation/idempotency stores and the gateway client.

use crate::config::Config;
use domain_messaging::{ConversationStateStore, IdempotencyStore};
use evolution_client::EvolutionClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use stream_worker::StreamProducer;

/// Shared application state.
///
/// Cloned per handler; all members are cheap handles over shared
/// connections.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: Config,
    /// Redis connection manager
    pub redis: ConnectionManager,
    /// Producer appending admitted messages to `messages:stream`
    pub producer: StreamProducer,
    /// Per-conversation timestamp marker and admission lock
    pub conversations: ConversationStateStore,
    /// Observed gateway message IDs
    pub idempotency: IdempotencyStore,
    /// WhatsApp gateway client (send-message endpoint, readiness probe)
    pub sender: Arc<EvolutionClient>,
}
