//! Route composition for the webhook API.

pub mod health;
pub mod messages;
pub mod webhook;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Business routes (webhook ingress + send-message).
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/webhook/evolution", post(webhook::receive_webhook))
        .route("/send-message", post(messages::send_message))
        .route("/", get(health::root_handler))
        .with_state(state)
}

/// Health routes (exempt from the admission gates).
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/live", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .with_state(state)
}
