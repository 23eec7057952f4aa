//! Webhook ingress: the admission path for inbound gateway events.
//!
//! The handler is the only writer of conversation state. Under the
//! conversation lock it checks ordering, publishes to the stream with the
//! gateway message ID as the stream ID, advances the last-seen timestamp and
//! records the ID as observed. Workers never touch the lock; they rely on
//! stream-ID order.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use domain_messaging::{
    parse_webhook_payload, verify_webhook_signature, InboundMessage, MessagingError,
    ProcessingJob,
};
use observability::{CorrelationId, MessagingMetrics};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Signature header sent by the gateway.
const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Outcome of one webhook admission.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    /// accepted | skipped | retry | ignored
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

impl WebhookResponse {
    fn accepted(stream_id: String) -> (StatusCode, Json<Self>) {
        (
            StatusCode::ACCEPTED,
            Json(Self {
                status: "accepted",
                reason: None,
                stream_id: Some(stream_id),
            }),
        )
    }

    fn skipped(reason: &'static str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                status: "skipped",
                reason: Some(reason),
                stream_id: None,
            }),
        )
    }

    fn retry(reason: &'static str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                status: "retry",
                reason: Some(reason),
                stream_id: None,
            }),
        )
    }

    fn ignored() -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                status: "ignored",
                reason: Some("not_a_message_event"),
                stream_id: None,
            }),
        )
    }
}

/// Error responses carry a plain JSON body.
fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Receive a webhook from the gateway.
///
/// `POST /webhook` and `POST /webhook/evolution`.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = Value,
    responses(
        (status = 202, description = "Message admitted to the stream", body = WebhookResponse),
        (status = 200, description = "Duplicate, out-of-order or non-message event", body = WebhookResponse),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Invalid webhook signature"),
        (status = 429, description = "Rate limited"),
        (status = 503, description = "System overloaded"),
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), (StatusCode, Json<Value>)> {
    // 1. Signature check: required whenever a secret is configured
    if let Some(secret) = &state.config.gateway.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if signature.is_empty() || !verify_webhook_signature(&body, signature, secret) {
            warn!(correlation_id = %correlation_id, "Invalid webhook signature");
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid signature",
            ));
        }
    }

    // 2. Parse the payload into the canonical inbound message
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)))?;

    let instance_id = payload
        .get("instance")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    MessagingMetrics::record_webhook_event(&instance_id, "message", "received");

    let message = match parse_webhook_payload(&payload) {
        Ok(Some(message)) => message,
        Ok(None) => {
            MessagingMetrics::record_webhook_event(&instance_id, "message", "ignored");
            return Ok(WebhookResponse::ignored());
        }
        Err(e @ (MessagingError::MissingField(_) | MessagingError::InvalidField { .. })) => {
            MessagingMetrics::record_webhook_event(&instance_id, "message", "rejected");
            return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
        }
        Err(e) => {
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
            ));
        }
    };

    admit_message(&state, &correlation_id, message)
        .await
        .map(|response| {
            MessagingMetrics::record_webhook_event(&instance_id, "message", response.1.status);
            response
        })
}

/// Steps 3-7 of the admission path: dedupe, lock, order-check, publish,
/// state update.
async fn admit_message(
    state: &AppState,
    correlation_id: &CorrelationId,
    message: InboundMessage,
) -> Result<(StatusCode, Json<WebhookResponse>), (StatusCode, Json<Value>)> {
    let gateway_message_id = message.gateway_message_id.clone();
    let conversation_key = message.conversation_key();
    let kind = message.kind;

    let internal = |e: &dyn std::fmt::Display| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    };

    // 3. Duplicate suppression
    if state
        .idempotency
        .seen(&gateway_message_id)
        .await
        .map_err(|e| internal(&e))?
    {
        info!(
            correlation_id = %correlation_id,
            gateway_message_id = %gateway_message_id,
            "Duplicate message suppressed"
        );
        MessagingMetrics::record_duplicate(&message.instance_id);
        return Ok(WebhookResponse::skipped("duplicate"));
    }

    // 4. Conversation lock for the enqueue decision only
    let lock_ttl = kind.lock_ttl_secs();
    let locked = state
        .conversations
        .try_acquire_lock(&conversation_key, lock_ttl)
        .await
        .map_err(|e| internal(&e))?;

    if !locked {
        warn!(
            correlation_id = %correlation_id,
            conversation_key = %conversation_key,
            "Conversation locked, asking gateway to retry"
        );
        MessagingMetrics::record_lock_failure(&kind.to_string());
        return Ok(WebhookResponse::retry("locked"));
    }

    let admission = admit_under_lock(state, correlation_id, message).await;

    // Lock release is unconditional; failure to release self-heals via TTL
    if let Err(e) = state.conversations.release_lock(&conversation_key).await {
        warn!(conversation_key = %conversation_key, error = %e, "Failed to release lock");
    }

    admission
}

async fn admit_under_lock(
    state: &AppState,
    correlation_id: &CorrelationId,
    message: InboundMessage,
) -> Result<(StatusCode, Json<WebhookResponse>), (StatusCode, Json<Value>)> {
    let gateway_message_id = message.gateway_message_id.clone();
    let conversation_key = message.conversation_key();
    let instance_id = message.instance_id.clone();
    let timestamp = message.timestamp;

    let internal = |e: &dyn std::fmt::Display| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    };

    // Re-check the idempotency set now that the lock is held: a request
    // that raced past the fast-path check while an identical one was being
    // admitted must still be suppressed
    if state
        .idempotency
        .seen(&gateway_message_id)
        .await
        .map_err(|e| internal(&e))?
    {
        MessagingMetrics::record_duplicate(&instance_id);
        return Ok(WebhookResponse::skipped("duplicate"));
    }

    // 5. Ordering check against the conversation's last-seen timestamp
    if state
        .conversations
        .is_out_of_order(&conversation_key, timestamp)
        .await
        .map_err(|e| internal(&e))?
    {
        MessagingMetrics::record_out_of_order(&instance_id);
        return Ok(WebhookResponse::skipped("out_of_order"));
    }

    // 6. Publish with the gateway message ID as the stream ID, which gives
    //    per-conversation FIFO on the single-partition stream
    let job = ProcessingJob::new(message, correlation_id.as_str());
    let stream_id = state
        .producer
        .publish_with_id(&job, Some(&gateway_message_id))
        .await
        .map_err(|e| internal(&e))?;

    // 7. Advance conversation state and record the ID as observed
    state
        .conversations
        .set_last_timestamp(&conversation_key, timestamp)
        .await
        .map_err(|e| internal(&e))?;
    state
        .idempotency
        .mark_seen(&gateway_message_id)
        .await
        .map_err(|e| internal(&e))?;

    info!(
        correlation_id = %correlation_id,
        conversation_key = %conversation_key,
        gateway_message_id = %gateway_message_id,
        stream_id = %stream_id,
        "Message admitted to stream"
    );

    Ok(WebhookResponse::accepted(stream_id))
}
