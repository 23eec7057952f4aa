//! Direct message sending endpoint.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use evolution_client::{MessageSender, OutgoingMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use utoipa::ToSchema;
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,}$").expect("valid regex"));

/// Request to send a message through the gateway.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// WhatsApp instance ID
    #[validate(length(min = 1))]
    pub instance_id: String,
    /// Target phone number (bare digits)
    #[validate(regex(path = *PHONE_RE))]
    pub phone_number: String,
    /// Message content
    #[validate(length(min = 1, max = 4096))]
    pub content: String,
    /// Gateway message ID to reply to
    pub reply_to: Option<String>,
}

/// Send a message via the gateway.
///
/// `POST /send-message`
#[utoipa::path(
    post,
    path = "/send-message",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message sent"),
        (status = 400, description = "Invalid request"),
        (status = 502, description = "Gateway rejected the message"),
    ),
    tag = "messages"
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    request.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    let outgoing = OutgoingMessage {
        instance_id: request.instance_id.clone(),
        phone_number: request.phone_number.clone(),
        content: request.content,
        reply_to: request.reply_to,
    };

    match state.sender.send_text(&outgoing).await {
        Ok(message_id) => {
            info!(
                instance_id = %request.instance_id,
                phone = %request.phone_number,
                "Message sent via API"
            );
            Ok(Json(json!({
                "status": "success",
                "message_id": message_id,
            })))
        }
        Err(e) => {
            error!(error = %e, "Failed to send message");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
