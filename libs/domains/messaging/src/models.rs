//! Canonical inbound message model.

use crate::error::MessagingError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Phone numbers are bare E.164 digits, at least ten of them.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,}$").expect("valid regex"));

/// Kind of an inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
    Location,
    Contact,
    Unknown,
}

impl MessageKind {
    /// Scheduling priority (lower = more urgent). Text is cheap to process,
    /// media needs transcription or analysis, large files are slowest.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Audio | Self::Voice | Self::Image | Self::Sticker => 2,
            Self::Video | Self::Document => 3,
            Self::Location | Self::Contact | Self::Unknown => 2,
        }
    }

    /// Conversation lock TTL in seconds, sized to how long admitting a
    /// message of this kind can reasonably take.
    pub fn lock_ttl_secs(&self) -> u64 {
        match self {
            Self::Audio | Self::Voice => 30,
            Self::Video => 25,
            Self::Image | Self::Document => 20,
            Self::Text => 10,
            _ => 10,
        }
    }

    /// Whether this message carries media to fetch.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Voice | Self::Document | Self::Sticker
        )
    }
}

/// Sender contact information.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub phone: String,
    pub name: Option<String>,
    pub push_name: Option<String>,
}

/// Attached media description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaInfo {
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
    pub file_name: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
}

/// Canonical inbound message, normalized from the gateway payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// External message ID assigned by the gateway; unique per message.
    pub gateway_message_id: String,
    /// WhatsApp instance the message arrived on.
    pub instance_id: String,
    /// Sender phone (bare digits).
    pub phone: String,
    pub contact: Contact,
    pub kind: MessageKind,
    /// Text content, or the media caption / placeholder for non-text kinds.
    pub content: String,
    pub media: Option<MediaInfo>,
    /// Event time, normalized to UTC. Expected monotonic per conversation.
    pub timestamp: DateTime<Utc>,
    /// Gateway ID of the quoted message, when this is a reply.
    pub reply_to: Option<String>,
    pub forwarded: bool,
    /// Original gateway payload, kept opaque.
    pub raw: Value,
}

impl InboundMessage {
    /// The unit of FIFO ordering: `instance_id:phone`.
    pub fn conversation_key(&self) -> String {
        format!("{}:{}", self.instance_id, self.phone)
    }

    /// Validate the invariants of the canonical event.
    pub fn validate(&self) -> Result<(), MessagingError> {
        if self.gateway_message_id.is_empty() {
            return Err(MessagingError::MissingField("key.id"));
        }
        if self.instance_id.is_empty() {
            return Err(MessagingError::MissingField("instance"));
        }
        if !PHONE_RE.is_match(&self.phone) {
            return Err(MessagingError::InvalidField {
                field: "phone",
                details: format!("'{}' does not match [0-9]{{10,}}", self.phone),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> InboundMessage {
        InboundMessage {
            gateway_message_id: "M1".to_string(),
            instance_id: "I1".to_string(),
            phone: "5511999999999".to_string(),
            contact: Contact::default(),
            kind: MessageKind::Text,
            content: "Olá".to_string(),
            media: None,
            timestamp: Utc::now(),
            reply_to: None,
            forwarded: false,
            raw: Value::Null,
        }
    }

    #[test]
    fn test_conversation_key() {
        assert_eq!(message().conversation_key(), "I1:5511999999999");
    }

    #[test]
    fn test_validate_accepts_canonical_message() {
        assert!(message().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let mut msg = message();
        msg.gateway_message_id.clear();
        assert!(matches!(
            msg.validate(),
            Err(MessagingError::MissingField("key.id"))
        ));
    }

    #[test]
    fn test_validate_rejects_short_phone() {
        let mut msg = message();
        msg.phone = "12345".to_string();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_digit_phone() {
        let mut msg = message();
        msg.phone = "55119999abc99".to_string();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_priorities() {
        assert_eq!(MessageKind::Text.priority(), 1);
        assert_eq!(MessageKind::Audio.priority(), 2);
        assert_eq!(MessageKind::Voice.priority(), 2);
        assert_eq!(MessageKind::Image.priority(), 2);
        assert_eq!(MessageKind::Sticker.priority(), 2);
        assert_eq!(MessageKind::Video.priority(), 3);
        assert_eq!(MessageKind::Document.priority(), 3);
        assert_eq!(MessageKind::Unknown.priority(), 2);
    }

    #[test]
    fn test_lock_ttls() {
        assert_eq!(MessageKind::Text.lock_ttl_secs(), 10);
        assert_eq!(MessageKind::Image.lock_ttl_secs(), 20);
        assert_eq!(MessageKind::Document.lock_ttl_secs(), 20);
        assert_eq!(MessageKind::Video.lock_ttl_secs(), 25);
        assert_eq!(MessageKind::Audio.lock_ttl_secs(), 30);
        assert_eq!(MessageKind::Voice.lock_ttl_secs(), 30);
        assert_eq!(MessageKind::Location.lock_ttl_secs(), 10);
    }

    #[test]
    fn test_kind_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageKind::Voice).unwrap(),
            "\"voice\""
        );
        let kind: MessageKind = serde_json::from_str("\"document\"").unwrap();
        assert_eq!(kind, MessageKind::Document);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::Voice.to_string(), "voice");
        assert_eq!(MessageKind::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_message_roundtrip_preserves_fields() {
        let msg = message();
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(back.gateway_message_id, msg.gateway_message_id);
        assert_eq!(back.instance_id, msg.instance_id);
        assert_eq!(back.phone, msg.phone);
        assert_eq!(back.kind, msg.kind);
        assert_eq!(back.content, msg.content);
        assert_eq!(back.timestamp, msg.timestamp);
    }
}
