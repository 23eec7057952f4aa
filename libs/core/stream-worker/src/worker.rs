//! The generic stream worker loop.
//!
//! One `StreamWorker` is one consumer in the group: it claims abandoned
//! entries, reads batches, hands each delivery to the processor, and acks,
//! retries or dead-letters depending on the outcome. Parallelism comes from
//! running N workers with unique consumer IDs, never from concurrency inside
//! one worker: entries must be processed in the order `consume` returned
//! them to preserve per-conversation FIFO.

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::dlq::DlqManager;
use crate::error::StreamError;
use crate::metrics::{self, JobStatus};
use crate::registry::{Delivery, StreamJob, StreamProcessor};
use crate::producer::StreamProducer;
use resilience::Retryable;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Generic stream worker that processes entries using a processor.
///
/// This struct encapsulates the worker loop with:
/// - Consumer group management
/// - Auto-claim of abandoned entries at the start of each cycle
/// - Retry with exponential backoff (sleep `2^retry` s, capped)
/// - Dead letter queue handling with error categorization
/// - Graceful shutdown
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: StreamConsumer,
    producer: StreamProducer,
    dlq: DlqManager,
    processor: Arc<P>,
    config: WorkerConfig,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob + 'static,
    P: StreamProcessor<J> + 'static,
{
    /// Create a new stream worker.
    pub fn new(redis: redis::aio::ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    /// Create a new stream worker with an Arc processor.
    pub fn with_arc_processor(
        redis: redis::aio::ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let consumer = StreamConsumer::new(redis.clone(), config.clone());
        let producer =
            StreamProducer::new(redis.clone(), config.stream_name.clone()).with_max_length(config.max_length);
        let dlq = DlqManager::new(redis, config.stream_name.clone(), config.dlq_stream.clone());

        Self {
            consumer,
            producer,
            dlq,
            processor,
            config,
            _phantom: PhantomData,
        }
    }

    /// Get a reference to the consumer for health checks.
    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Get a clone of the DLQ manager.
    pub fn dlq(&self) -> DlqManager {
        self.dlq.clone()
    }

    /// Run the worker loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            batch_size = %self.config.batch_size,
            block_ms = %self.config.block_ms,
            auto_claim_idle_ms = %self.config.auto_claim_idle_ms,
            "Starting stream worker"
        );

        self.consumer.ensure_consumer_group().await?;

        // Track consecutive errors for exponential reconnect backoff
        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            match self.run_cycle().await {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!(
                            "Connection recovered after {} errors",
                            consecutive_errors
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    if e.is_block_timeout() {
                        debug!("BLOCK timeout - no entries, continuing");
                        continue;
                    }

                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs =
                            std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Redis connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error in consume cycle");
                    }

                    // Brief pause before the next cycle so a hard failure
                    // does not spin the loop
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                    continue;
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// One consume cycle: auto-claim, read pending + new, process in order.
    async fn run_cycle(&self) -> Result<(), StreamError> {
        // Claim entries abandoned by crashed consumers first; XAUTOCLAIM
        // preserves stream IDs so conversation order survives the handover
        let claimed = if self.config.auto_claim_idle_ms > 0 {
            self.consumer
                .auto_claim::<J>(self.config.auto_claim_idle_ms, self.config.batch_size)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let pending = self.consumer.read_pending_entries::<J>().await?;
        let fresh = self.consumer.read_new_entries::<J>().await?;

        let total = claimed.len() + pending.len() + fresh.len();
        if total == 0 {
            return Ok(());
        }
        metrics::record_batch_size(&self.config.stream_name, total);

        for delivery in claimed.into_iter().chain(pending).chain(fresh) {
            self.process_delivery(&delivery).await;
        }

        if let Ok(depth) = self.consumer.length().await {
            metrics::set_queue_depth(&self.config.stream_name, depth as f64);
        }

        Ok(())
    }

    /// Process a single delivery and settle it (ack / retry / DLQ).
    async fn process_delivery(&self, delivery: &Delivery<J>) {
        debug!(
            stream_id = %delivery.stream_id,
            job_id = %delivery.job.job_id(),
            claimed = %delivery.claimed,
            "Processing entry"
        );

        let start = std::time::Instant::now();

        match self.processor.process(delivery).await {
            Ok(()) => {
                metrics::record_job_processed(&self.config.stream_name, JobStatus::Success);
                metrics::record_job_duration(&self.config.stream_name, "process", start.elapsed());

                if let Err(e) = self.consumer.ack(&delivery.stream_id).await {
                    error!(stream_id = %delivery.stream_id, error = %e, "Failed to ACK entry");
                }
            }
            Err(e) => {
                metrics::record_job_processed(&self.config.stream_name, JobStatus::Failed);
                metrics::record_error(&self.config.stream_name, e.dlq_category());

                warn!(
                    stream_id = %delivery.stream_id,
                    job_id = %delivery.job.job_id(),
                    error = %e,
                    error_category = %e.dlq_category(),
                    retryable = %e.retryable(),
                    "Entry processing failed"
                );

                if let Err(handler_err) = self.settle_failure(delivery, e).await {
                    error!(
                        stream_id = %delivery.stream_id,
                        error = %handler_err,
                        "Failed to settle failed entry"
                    );
                    // Still ACK to prevent an infinite redelivery loop
                    let _ = self.consumer.ack(&delivery.stream_id).await;
                }
            }
        }
    }

    /// Retry or dead-letter a failed entry, then ack the original.
    async fn settle_failure(
        &self,
        delivery: &Delivery<J>,
        err: StreamError,
    ) -> Result<(), StreamError> {
        let job = &delivery.job;
        let retry_count = job.retry_count();

        if err.retryable() && retry_count < self.config.max_retries {
            let retry_job = job.with_retry();
            metrics::record_retry(&self.config.stream_name, retry_count + 1);

            self.producer.publish(&retry_job).await?;
            self.consumer.ack(&delivery.stream_id).await?;

            // Backoff between attempts: 2^retry seconds, capped
            let sleep_secs = std::cmp::min(
                2u64.saturating_pow(retry_count),
                self.config.max_retry_sleep_secs,
            );
            info!(
                job_id = %job.job_id(),
                retry_attempt = %(retry_count + 1),
                sleep_secs = %sleep_secs,
                "Republished entry for retry"
            );
            tokio::time::sleep(Duration::from_secs(sleep_secs)).await;

            return Ok(());
        }

        // Exhausted retries or non-retryable failure: dead-letter
        metrics::record_job_processed(&self.config.stream_name, JobStatus::Dlq);

        if self.config.enable_dlq {
            let payload = serde_json::to_string(job)?;
            self.dlq
                .add(
                    &delivery.stream_id,
                    &payload,
                    &err.to_string(),
                    err.dlq_category(),
                    retry_count,
                    &job.message_kind(),
                    job.source(),
                    None,
                )
                .await?;
        }

        self.consumer.ack(&delivery.stream_id).await?;
        Ok(())
    }
}
