//! Gateway (Evolution API) webhook payload parsing.
//!
//! The gateway posts `{instance, data: {key, message, pushName,
//! messageTimestamp, status?}}`. Delivery acknowledgments without content are
//! not message events and parse to `None`; unrecognized message shapes parse
//! to `MessageKind::Unknown` with a placeholder content so they still flow
//! through the pipeline.

use crate::error::MessagingError;
use crate::models::{Contact, InboundMessage, MediaInfo, MessageKind};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

const JID_SUFFIX: &str = "@s.whatsapp.net";

/// Parse a gateway webhook payload into the canonical inbound message.
///
/// Returns `Ok(None)` for non-message events (status updates, delivery
/// acknowledgments without content). Returns an error when a message event
/// is missing required fields or violates an invariant.
pub fn parse_webhook_payload(payload: &Value) -> Result<Option<InboundMessage>, MessagingError> {
    let instance_id = payload
        .get("instance")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let Some(data) = payload.get("data").filter(|d| d.is_object()) else {
        return Err(MessagingError::MissingField("data"));
    };

    if !is_message_event(data) {
        debug!(
            status = data.get("status").and_then(serde_json::Value::as_str).unwrap_or(""),
            "Skipping non-message event"
        );
        return Ok(None);
    }

    let key = data.get("key").unwrap_or(&Value::Null);
    let gateway_message_id = key
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if gateway_message_id.is_empty() {
        return Err(MessagingError::MissingField("key.id"));
    }

    let phone = key
        .get("remoteJid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim_end_matches(JID_SUFFIX)
        .to_string();
    if phone.is_empty() {
        return Err(MessagingError::MissingField("key.remoteJid"));
    }

    let message_info = data.get("message").unwrap_or(&Value::Null);
    let (kind, content, media) = extract_content(message_info);

    let push_name = data
        .get("pushName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let contact = Contact {
        phone: phone.clone(),
        name: push_name.clone(),
        push_name,
    };

    let timestamp = parse_timestamp(data.get("messageTimestamp"));

    let context_info = message_info.get("contextInfo").unwrap_or(&Value::Null);
    let reply_to = context_info
        .get("stanzaId")
        .and_then(Value::as_str)
        .map(str::to_string);
    let forwarded = context_info
        .get("isForwarded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let message = InboundMessage {
        gateway_message_id,
        instance_id,
        phone,
        contact,
        kind,
        content,
        media,
        timestamp,
        reply_to,
        forwarded,
        raw: payload.clone(),
    };
    message.validate()?;

    Ok(Some(message))
}

/// Whether the webhook data describes an actual message event.
///
/// Pure delivery/read acknowledgments are skipped, unless the payload still
/// carries message content (the gateway sometimes attaches it).
fn is_message_event(data: &Value) -> bool {
    let has_message = data.get("message").map(Value::is_object).unwrap_or(false);
    let has_key = data.get("key").map(Value::is_object).unwrap_or(false);

    let status = data.get("status").and_then(Value::as_str).unwrap_or("");
    let is_delivery_ack = matches!(status, "DELIVERY_ACK" | "READ_ACK" | "PLAYED_ACK");

    let has_content = data
        .get("message")
        .map(|m| {
            [
                "conversation",
                "extendedTextMessage",
                "imageMessage",
                "videoMessage",
                "audioMessage",
                "documentMessage",
                "stickerMessage",
                "locationMessage",
                "contactMessage",
            ]
            .iter()
            .any(|field| m.get(field).is_some())
        })
        .unwrap_or(false);

    has_message && has_key && (!is_delivery_ack || has_content)
}

/// Extract message kind, textual content and media info.
fn extract_content(message_info: &Value) -> (MessageKind, String, Option<MediaInfo>) {
    if let Some(text) = message_info.get("conversation").and_then(Value::as_str) {
        return (MessageKind::Text, text.to_string(), None);
    }

    if let Some(ext) = message_info.get("extendedTextMessage") {
        let text = ext.get("text").and_then(Value::as_str).unwrap_or_default();
        return (MessageKind::Text, text.to_string(), None);
    }

    if let Some(img) = message_info.get("imageMessage") {
        let caption = string_field(img, "caption");
        let media = media_info(img, caption.clone(), None);
        return (MessageKind::Image, caption.unwrap_or_default(), Some(media));
    }

    if let Some(vid) = message_info.get("videoMessage") {
        let caption = string_field(vid, "caption");
        let media = media_info(vid, caption.clone(), None);
        return (MessageKind::Video, caption.unwrap_or_default(), Some(media));
    }

    if let Some(audio) = message_info.get("audioMessage") {
        let media = media_info(audio, None, None);
        // Push-to-talk marks a recorded voice note
        let is_voice = audio.get("ptt").and_then(Value::as_bool).unwrap_or(false);
        return if is_voice {
            (MessageKind::Voice, "[Mensagem de voz]".to_string(), Some(media))
        } else {
            (MessageKind::Audio, "[Áudio]".to_string(), Some(media))
        };
    }

    if let Some(doc) = message_info.get("documentMessage") {
        let file_name = string_field(doc, "fileName");
        let media = media_info(doc, None, file_name.clone());
        return (
            MessageKind::Document,
            file_name.unwrap_or_else(|| "[Documento]".to_string()),
            Some(media),
        );
    }

    if message_info.get("stickerMessage").is_some() {
        return (MessageKind::Sticker, "[Figurinha]".to_string(), None);
    }

    if let Some(loc) = message_info.get("locationMessage") {
        let lat = loc.get("degreesLatitude").and_then(Value::as_f64).unwrap_or(0.0);
        let lng = loc.get("degreesLongitude").and_then(Value::as_f64).unwrap_or(0.0);
        return (
            MessageKind::Location,
            format!("📍 Localização: {}, {}", lat, lng),
            None,
        );
    }

    if let Some(contact) = message_info.get("contactMessage") {
        let name = contact
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or("Desconhecido");
        return (MessageKind::Contact, format!("📞 Contato: {}", name), None);
    }

    warn!(
        keys = ?message_info.as_object().map(|o| o.keys().collect::<Vec<_>>()),
        "Unknown message shape"
    );
    (
        MessageKind::Unknown,
        "[Tipo de mensagem não suportado]".to_string(),
        None,
    )
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn media_info(value: &Value, caption: Option<String>, file_name: Option<String>) -> MediaInfo {
    MediaInfo {
        mime_type: string_field(value, "mimetype"),
        file_size: value
            .get("fileLength")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))),
        file_name,
        url: string_field(value, "url"),
        caption,
    }
}

/// Normalize the gateway timestamp to UTC.
///
/// Accepts epoch seconds (number or numeric string) and RFC 3339 strings;
/// anything else falls back to the current time.
fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now),
        Some(Value::String(s)) => {
            if let Ok(secs) = s.parse::<i64>() {
                DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
            } else {
                DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00"))
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now())
            }
        }
        _ => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_payload() -> Value {
        json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M1", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {"conversation": "Olá"},
                "pushName": "João",
                "messageTimestamp": 1_700_000_000
            }
        })
    }

    #[test]
    fn test_parse_text_message() {
        let msg = parse_webhook_payload(&text_payload()).unwrap().unwrap();

        assert_eq!(msg.gateway_message_id, "M1");
        assert_eq!(msg.instance_id, "I1");
        assert_eq!(msg.phone, "5511999999999");
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.content, "Olá");
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(msg.contact.push_name.as_deref(), Some("João"));
        assert_eq!(msg.conversation_key(), "I1:5511999999999");
        assert!(!msg.forwarded);
    }

    #[test]
    fn test_parse_extended_text() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M2", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {
                    "extendedTextMessage": {"text": "link aqui"},
                    "contextInfo": {"stanzaId": "M1", "isForwarded": true}
                },
                "messageTimestamp": 1_700_000_001
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.content, "link aqui");
        assert_eq!(msg.reply_to.as_deref(), Some("M1"));
        assert!(msg.forwarded);
    }

    #[test]
    fn test_parse_voice_message() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M3", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {
                    "audioMessage": {
                        "mimetype": "audio/ogg; codecs=opus",
                        "fileLength": "13337",
                        "url": "https://cdn.example/audio.ogg",
                        "ptt": true
                    }
                },
                "messageTimestamp": 1_700_000_002
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Voice);
        assert_eq!(msg.content, "[Mensagem de voz]");
        let media = msg.media.unwrap();
        assert_eq!(media.mime_type.as_deref(), Some("audio/ogg; codecs=opus"));
        assert_eq!(media.file_size, Some(13337));
        assert_eq!(media.url.as_deref(), Some("https://cdn.example/audio.ogg"));
    }

    #[test]
    fn test_parse_audio_without_ptt() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M4", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {"audioMessage": {"mimetype": "audio/mp4"}},
                "messageTimestamp": 1_700_000_003
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Audio);
    }

    #[test]
    fn test_parse_image_caption_becomes_content() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M5", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {
                    "imageMessage": {
                        "mimetype": "image/jpeg",
                        "caption": "essa casa",
                        "url": "https://cdn.example/img.jpg"
                    }
                },
                "messageTimestamp": 1_700_000_004
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Image);
        assert_eq!(msg.content, "essa casa");
        assert_eq!(msg.media.unwrap().caption.as_deref(), Some("essa casa"));
    }

    #[test]
    fn test_parse_document_uses_file_name() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M6", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {
                    "documentMessage": {"fileName": "contrato.pdf", "mimetype": "application/pdf"}
                },
                "messageTimestamp": 1_700_000_005
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Document);
        assert_eq!(msg.content, "contrato.pdf");
        assert_eq!(msg.media.unwrap().file_name.as_deref(), Some("contrato.pdf"));
    }

    #[test]
    fn test_parse_unknown_kind_gets_placeholder() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M7", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {"pollCreationMessage": {"name": "enquete"}},
                "messageTimestamp": 1_700_000_006
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert_eq!(msg.content, "[Tipo de mensagem não suportado]");
    }

    #[test]
    fn test_missing_gateway_id_is_an_error() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {"conversation": "oi"}
            }
        });

        assert!(matches!(
            parse_webhook_payload(&payload),
            Err(MessagingError::MissingField("key.id"))
        ));
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let payload = json!({"instance": "I1"});
        assert!(matches!(
            parse_webhook_payload(&payload),
            Err(MessagingError::MissingField("data"))
        ));
    }

    #[test]
    fn test_delivery_ack_without_content_is_skipped() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M8", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {},
                "status": "DELIVERY_ACK"
            }
        });

        assert!(parse_webhook_payload(&payload).unwrap().is_none());
    }

    #[test]
    fn test_delivery_ack_with_content_is_processed() {
        let payload = json!({
            "instance": "I1",
            "data": {
                "key": {"id": "M9", "remoteJid": "5511999999999@s.whatsapp.net"},
                "message": {"conversation": "chegou mesmo assim"},
                "status": "DELIVERY_ACK",
                "messageTimestamp": 1_700_000_007
            }
        });

        let msg = parse_webhook_payload(&payload).unwrap().unwrap();
        assert_eq!(msg.content, "chegou mesmo assim");
    }

    #[test]
    fn test_timestamp_from_numeric_string() {
        let ts = parse_timestamp(Some(&json!("1700000000")));
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_timestamp_from_iso_string() {
        let ts = parse_timestamp(Some(&json!("2023-11-14T22:13:20Z")));
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_serialize_parse_is_identity() {
        let msg = parse_webhook_payload(&text_payload()).unwrap().unwrap();
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(back.gateway_message_id, msg.gateway_message_id);
        assert_eq!(back.instance_id, msg.instance_id);
        assert_eq!(back.phone, msg.phone);
        assert_eq!(back.kind, msg.kind);
        assert_eq!(back.content, msg.content);
        assert_eq!(back.media, msg.media);
        assert_eq!(back.timestamp, msg.timestamp);
        assert_eq!(back.reply_to, msg.reply_to);
        assert_eq!(back.forwarded, msg.forwarded);
    }
}
