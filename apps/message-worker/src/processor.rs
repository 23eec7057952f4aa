//! The message processor: one delivered stream entry in, one settled
//! conversation turn out.
//!
//! For each entry the processor selects a workflow (honoring a forced
//! workflow from a prior hand-off), executes it under an admission-derived
//! deadline, routes the reply back to the gateway exactly once, and
//! translates failures into `StreamError` so the worker loop can retry or
//! dead-letter the entry.

use admission::{timeout_for_level, LoadMonitor};
use async_trait::async_trait;
use domain_messaging::{IdempotencyStore, MessageKind, ProcessingJob};
use domain_workflows::{
    classify_intent, workflow_for, WorkflowEngine, WorkflowError, WorkflowState, WorkflowStatus,
};
use evolution_client::{MessageSender, OutgoingMessage};
use observability::MessagingMetrics;
use resilience::Retryable;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use stream_worker::{Delivery, StreamError, StreamJob, StreamProcessor, StreamProducer};
use tracing::{info, warn, Instrument};

/// Neutral reply when a workflow completes without producing one.
const NEUTRAL_REPLY: &str = "Tudo certo por aqui. Como posso ajudar você com imóveis hoje?";

/// Short apology sent when a message fails terminally.
const APOLOGY_REPLY: &str =
    "Desculpe, tive um problema ao processar sua mensagem. Pode tentar novamente em instantes?";

pub struct MessageProcessor {
    engine: Arc<WorkflowEngine>,
    sender: Arc<dyn MessageSender>,
    idempotency: IdempotencyStore,
    producer: StreamProducer,
    monitor: Arc<LoadMonitor>,
}

impl MessageProcessor {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        sender: Arc<dyn MessageSender>,
        idempotency: IdempotencyStore,
        producer: StreamProducer,
        monitor: Arc<LoadMonitor>,
    ) -> Self {
        Self {
            engine,
            sender,
            idempotency,
            producer,
            monitor,
        }
    }

    /// Pick the workflow for a job: an explicit hand-off wins, otherwise
    /// intent classification on kind and content.
    pub fn select_workflow(job: &ProcessingJob) -> String {
        if let Some(forced) = &job.forced_workflow {
            return forced.clone();
        }

        let is_audio = matches!(job.kind(), MessageKind::Audio | MessageKind::Voice);
        let intent = classify_intent(&job.message.content, is_audio);
        workflow_for(intent).to_string()
    }

    /// Build the initial workflow state for a job.
    fn initial_state(job: &ProcessingJob) -> WorkflowState {
        let mut context = serde_json::Map::new();
        context.insert(
            "message_content".to_string(),
            json!(job.message.content.clone()),
        );
        context.insert("message_type".to_string(), json!(job.message_kind()));
        context.insert(
            "instance_id".to_string(),
            json!(job.message.instance_id.clone()),
        );
        context.insert(
            "gateway_message_id".to_string(),
            json!(job.message.gateway_message_id.clone()),
        );

        if let Some(media) = &job.message.media {
            if let Some(url) = &media.url {
                context.insert("audio_url".to_string(), json!(url.clone()));
                context.insert("file_url".to_string(), json!(url.clone()));
            }
            if let Some(mime) = &media.mime_type {
                context.insert("content_type".to_string(), json!(mime.clone()));
            }
        }

        WorkflowState::new(
            job.conversation_key(),
            job.message.phone.clone(),
            job.correlation_id.clone(),
            context,
        )
    }

    /// Re-enqueue a transcribed message under its follow-up workflow.
    async fn enqueue_follow_up(
        &self,
        job: &ProcessingJob,
        next_workflow: &str,
        outputs: &serde_json::Map<String, Value>,
    ) -> Result<(), StreamError> {
        let transcribed = outputs
            .get("processed_content")
            .and_then(Value::as_str)
            .unwrap_or(&job.message.content)
            .to_string();

        let mut follow_up = job.clone().for_workflow(next_workflow);
        follow_up.message.content = transcribed;
        follow_up.message.kind = MessageKind::Text;
        follow_up.source = "message_worker".to_string();

        let stream_id = self.producer.publish(&follow_up).await?;
        info!(
            gateway_message_id = %job.message.gateway_message_id,
            next_workflow = %next_workflow,
            stream_id = %stream_id,
            "Re-enqueued message under follow-up workflow"
        );
        Ok(())
    }

    /// Send the reply for a completed execution, exactly once per entry.
    async fn send_reply(
        &self,
        delivery: &Delivery<ProcessingJob>,
        reply: &str,
    ) -> Result<(), StreamError> {
        let job = &delivery.job;

        // Claim the reply guard first; a redelivered entry whose previous
        // consumer crashed after sending must not send twice
        if !self.idempotency.try_mark_processed(&delivery.stream_id).await? {
            warn!(
                stream_id = %delivery.stream_id,
                gateway_message_id = %job.message.gateway_message_id,
                "Reply already sent for this entry, skipping"
            );
            return Ok(());
        }

        let instance_id = &job.message.instance_id;
        let phone = &job.message.phone;

        // Presence and read receipts are cosmetic; failures are ignored
        let _ = self.sender.mark_read(instance_id, &job.message.gateway_message_id).await;
        let _ = self.sender.set_typing(instance_id, phone, true).await;

        let outgoing = OutgoingMessage {
            instance_id: instance_id.clone(),
            phone_number: phone.clone(),
            content: reply.to_string(),
            reply_to: Some(job.message.gateway_message_id.clone()),
        };

        let send_result = self.sender.send_text(&outgoing).await;

        let _ = self.sender.set_typing(instance_id, phone, false).await;

        match send_result {
            Ok(_) => {
                MessagingMetrics::record_reply_sent(instance_id);
                Ok(())
            }
            Err(e) => {
                // Release the guard so a retry may deliver the reply
                let _ = self.idempotency.clear_processed(&delivery.stream_id).await;
                Err(StreamError::Call(e))
            }
        }
    }

    /// Whether this failure will be terminal for the entry.
    fn is_final_attempt(job: &ProcessingJob, err: &StreamError) -> bool {
        !err.retryable() || job.retry_count() >= job.max_retries()
    }

    async fn process_inner(
        &self,
        delivery: &Delivery<ProcessingJob>,
    ) -> Result<(), StreamError> {
        let job = &delivery.job;
        let workflow_name = Self::select_workflow(job);
        let deadline = timeout_for_level(self.monitor.snapshot().await.level);
        let started = Instant::now();

        info!(
            workflow = %workflow_name,
            kind = %job.message_kind(),
            reprocessed = %job.reprocessed_from_dlq,
            deadline_secs = %deadline.as_secs(),
            "Processing message"
        );

        let state = Self::initial_state(job);
        let execution = self
            .engine
            .execute(&workflow_name, state, deadline)
            .await
            .map_err(|e| match e {
                WorkflowError::Cancelled(reason) => StreamError::Cancelled(reason),
                WorkflowError::UnknownWorkflow(name) => {
                    StreamError::Processing(format!("invalid workflow selection: {}", name))
                }
                other => StreamError::Processing(other.to_string()),
            })?;

        MessagingMetrics::record_processing_duration(&workflow_name, started.elapsed());

        match execution.status {
            WorkflowStatus::Completed => {
                if let Some(next_workflow) = execution.next_workflow() {
                    // No reply yet; the follow-up workflow produces it
                    self.enqueue_follow_up(job, next_workflow, &execution.node_outputs)
                        .await?;
                } else {
                    let reply = execution.reply().unwrap_or(NEUTRAL_REPLY).to_string();
                    self.send_reply(delivery, &reply).await?;
                }

                MessagingMetrics::record_processed("success", &job.message_kind());
                Ok(())
            }
            WorkflowStatus::Cancelled => {
                MessagingMetrics::record_processed("cancelled", &job.message_kind());
                Err(StreamError::Cancelled(
                    execution
                        .error
                        .unwrap_or_else(|| "execution deadline elapsed".to_string()),
                ))
            }
            _ => {
                let error_text = execution
                    .error
                    .unwrap_or_else(|| "workflow failed without error detail".to_string());
                MessagingMetrics::record_processed("failed", &job.message_kind());
                Err(StreamError::Processing(error_text))
            }
        }
    }
}

#[async_trait]
impl StreamProcessor<ProcessingJob> for MessageProcessor {
    async fn process(&self, delivery: &Delivery<ProcessingJob>) -> Result<(), StreamError> {
        let job = &delivery.job;
        let span = tracing::info_span!(
            "process_message",
            correlation_id = %job.correlation_id,
            conversation_key = %job.conversation_key(),
            gateway_message_id = %job.message.gateway_message_id,
            stream_id = %delivery.stream_id,
        );

        let result = self.process_inner(delivery).instrument(span).await;

        // A terminal failure still owes the user a short apology before the
        // entry is dead-lettered
        if let Err(err) = &result {
            if Self::is_final_attempt(job, err) && !matches!(err, StreamError::Cancelled(_)) {
                if let Err(send_err) = self.send_reply(delivery, APOLOGY_REPLY).await {
                    warn!(
                        gateway_message_id = %job.message.gateway_message_id,
                        error = %send_err,
                        "Failed to deliver apology reply"
                    );
                }
            }
        }

        result
    }

    fn name(&self) -> &'static str {
        "MessageProcessor"
    }

    async fn health_check(&self) -> Result<bool, StreamError> {
        // Downstream agent health is surfaced via breaker state; the
        // processor itself is healthy whenever it can be polled
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain_messaging::{Contact, InboundMessage};

    fn message(kind: MessageKind, content: &str) -> InboundMessage {
        InboundMessage {
            gateway_message_id: "M1".to_string(),
            instance_id: "I1".to_string(),
            phone: "5511999999999".to_string(),
            contact: Contact::default(),
            kind,
            content: content.to_string(),
            media: None,
            timestamp: Utc::now(),
            reply_to: None,
            forwarded: false,
            raw: Value::Null,
        }
    }

    #[test]
    fn test_workflow_selection_by_intent() {
        let job = ProcessingJob::new(message(MessageKind::Text, "Olá"), "corr-1");
        assert_eq!(MessageProcessor::select_workflow(&job), "greeting_workflow");

        let job = ProcessingJob::new(
            message(MessageKind::Text, "Procuro casa 3 quartos em Uberlândia"),
            "corr-1",
        );
        assert_eq!(
            MessageProcessor::select_workflow(&job),
            "property_search_workflow"
        );

        let job = ProcessingJob::new(message(MessageKind::Voice, "[Mensagem de voz]"), "corr-1");
        assert_eq!(
            MessageProcessor::select_workflow(&job),
            "audio_processing_workflow"
        );

        let job = ProcessingJob::new(message(MessageKind::Text, "blz"), "corr-1");
        assert_eq!(
            MessageProcessor::select_workflow(&job),
            "general_conversation_workflow"
        );
    }

    #[test]
    fn test_forced_workflow_wins() {
        let job = ProcessingJob::new(message(MessageKind::Text, "Olá"), "corr-1")
            .for_workflow("property_search_workflow");
        assert_eq!(
            MessageProcessor::select_workflow(&job),
            "property_search_workflow"
        );
    }

    #[test]
    fn test_initial_state_carries_media_context() {
        let mut msg = message(MessageKind::Voice, "[Mensagem de voz]");
        msg.media = Some(domain_messaging::MediaInfo {
            mime_type: Some("audio/ogg".to_string()),
            url: Some("https://cdn/voice.ogg".to_string()),
            ..Default::default()
        });
        let job = ProcessingJob::new(msg, "corr-1");

        let state = MessageProcessor::initial_state(&job);
        assert_eq!(state.context_str("audio_url"), Some("https://cdn/voice.ogg"));
        assert_eq!(state.context_str("content_type"), Some("audio/ogg"));
        assert_eq!(state.context_str("message_type"), Some("voice"));
        assert_eq!(state.conversation_key, "I1:5511999999999");
        assert_eq!(state.user_id, "5511999999999");
    }

    #[test]
    fn test_final_attempt_detection() {
        let job = ProcessingJob::new(message(MessageKind::Text, "oi"), "corr-1");

        // Retryable error with retries left: not final
        let err = StreamError::Processing("503 from rag".to_string());
        assert!(!MessageProcessor::is_final_attempt(&job, &err));

        // Retryable error on the last attempt: final
        let exhausted = job.with_retry().with_retry().with_retry();
        assert!(MessageProcessor::is_final_attempt(&exhausted, &err));

        // Non-retryable error is always final
        let err = StreamError::Processing("validation failed".to_string());
        assert!(MessageProcessor::is_final_attempt(&job, &err));
    }
}
