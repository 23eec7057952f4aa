use crate::api::messages::SendMessageRequest;
use crate::api::webhook::WebhookResponse;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::webhook::receive_webhook,
        crate::api::messages::send_message,
    ),
    components(schemas(WebhookResponse, SendMessageRequest)),
    info(
        title = "Webhook API",
        version = "0.1.0",
        description = "WhatsApp gateway ingress: webhook admission, message sending and DLQ administration"
    ),
    tags(
        (name = "webhooks", description = "Inbound gateway events"),
        (name = "messages", description = "Outbound message sending"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();
        assert!(json.contains("/webhook"));
        assert!(json.contains("/send-message"));
    }
}
