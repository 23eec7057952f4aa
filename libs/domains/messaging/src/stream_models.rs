//! The job that flows through `messages:stream`.

use crate::models::{InboundMessage, MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stream_worker::StreamJob;
use uuid::Uuid;

/// One inbound message enqueued for pipeline processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// The canonical inbound message.
    pub message: InboundMessage,
    /// Correlation ID threaded from the webhook request through agent calls.
    pub correlation_id: String,
    /// Scheduling priority (lower = more urgent).
    pub priority: u8,
    /// Current retry count; travels with the payload across republishes.
    pub retry_count: u32,
    /// Service that published the entry.
    pub source: String,
    /// When the entry was published.
    pub published_at: DateTime<Utc>,
    /// Set when the entry came back from the DLQ.
    #[serde(default)]
    pub reprocessed_from_dlq: bool,
    /// Workflow override, set when a prior workflow re-enqueued this message
    /// (audio transcription hands off to property search this way).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_workflow: Option<String>,
}

impl ProcessingJob {
    /// Build a job for a freshly admitted message.
    pub fn new(message: InboundMessage, correlation_id: impl Into<String>) -> Self {
        let priority = message.kind.priority();
        Self {
            message,
            correlation_id: correlation_id.into(),
            priority,
            retry_count: 0,
            source: "webhook_api".to_string(),
            published_at: Utc::now(),
            reprocessed_from_dlq: false,
            forced_workflow: None,
        }
    }

    /// Derive a follow-up job that re-enters the stream under another
    /// workflow (content already rewritten by the caller).
    pub fn for_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.forced_workflow = Some(workflow.into());
        self.correlation_id = format!("{}:{}", self.correlation_id, Uuid::new_v4().simple());
        self.retry_count = 0;
        self.published_at = Utc::now();
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind
    }

    pub fn conversation_key(&self) -> String {
        self.message.conversation_key()
    }
}

impl StreamJob for ProcessingJob {
    fn job_id(&self) -> String {
        self.message.gateway_message_id.clone()
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn message_kind(&self) -> String {
        self.message.kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use serde_json::Value;

    fn message(kind: MessageKind) -> InboundMessage {
        InboundMessage {
            gateway_message_id: "M1".to_string(),
            instance_id: "I1".to_string(),
            phone: "5511999999999".to_string(),
            contact: Contact::default(),
            kind,
            content: "Olá".to_string(),
            media: None,
            timestamp: Utc::now(),
            reply_to: None,
            forwarded: false,
            raw: Value::Null,
        }
    }

    #[test]
    fn test_new_job_inherits_kind_priority() {
        let job = ProcessingJob::new(message(MessageKind::Video), "corr-1");
        assert_eq!(job.priority, 3);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.source, "webhook_api");
        assert!(!job.reprocessed_from_dlq);
        assert!(job.forced_workflow.is_none());
    }

    #[test]
    fn test_stream_job_identity_is_gateway_id() {
        let job = ProcessingJob::new(message(MessageKind::Text), "corr-1");
        assert_eq!(job.job_id(), "M1");
        assert_eq!(job.message_kind(), "text");
    }

    #[test]
    fn test_with_retry_keeps_identity() {
        let job = ProcessingJob::new(message(MessageKind::Text), "corr-1");
        let retried = job.with_retry();

        assert_eq!(retried.retry_count(), 1);
        assert_eq!(retried.job_id(), job.job_id());
        assert_eq!(retried.correlation_id, job.correlation_id);
        assert!(job.can_retry());
        assert!(!retried.with_retry().with_retry().can_retry());
    }

    #[test]
    fn test_for_workflow_resets_retries() {
        let job = ProcessingJob::new(message(MessageKind::Voice), "corr-1")
            .with_retry()
            .for_workflow("property_search_workflow");

        assert_eq!(
            job.forced_workflow.as_deref(),
            Some("property_search_workflow")
        );
        assert_eq!(job.retry_count, 0);
        assert!(job.correlation_id.starts_with("corr-1:"));
    }

    #[test]
    fn test_deserializes_without_optional_fields() {
        // Entries published before the DLQ flag existed still parse
        let raw = serde_json::json!({
            "message": message(MessageKind::Text),
            "correlation_id": "corr-1",
            "priority": 1,
            "retry_count": 2,
            "source": "webhook_api",
            "published_at": Utc::now().to_rfc3339(),
        });

        let job: ProcessingJob = serde_json::from_value(raw).unwrap();
        assert_eq!(job.retry_count, 2);
        assert!(!job.reprocessed_from_dlq);
        assert!(job.forced_workflow.is_none());
    }

    #[test]
    fn test_reprocessed_flag_roundtrip() {
        let mut job = ProcessingJob::new(message(MessageKind::Text), "corr-1");
        job.reprocessed_from_dlq = true;

        let json = serde_json::to_string(&job).unwrap();
        let back: ProcessingJob = serde_json::from_str(&json).unwrap();
        assert!(back.reprocessed_from_dlq);
    }
}
