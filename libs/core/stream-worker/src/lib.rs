//! Stream Worker - Redis Streams message fabric
//!
//! A reusable library for building Redis Streams pipelines with:
//! - Consumer group support for horizontal scaling
//! - Per-key ordering via caller-supplied stream IDs (`id_hint`)
//! - Automatic retry with exponential backoff (capped at 60 s)
//! - Error categorization for DLQ bookkeeping (timeout, connection,
//!   rate_limit, auth, validation, other)
//! - Dead letter queue with a time index, reprocessing and failure analysis
//! - Auto-claim of entries abandoned by crashed consumers
//! - Graceful shutdown handling
//! - Health check and DLQ admin endpoints
//!
//! # Architecture
//!
//! ```text
//! Redis Stream (messages:stream)
//!   ↓ (Consumer Group: processors)
//! StreamWorker<J, P>
//!   ↓ (processes entries)
//! StreamProcessor<J>
//!   ↓ (on exhausted retries / permanent failure)
//! DLQ Stream (messages:stream:dlq) + index (messages:stream:dlq:index)
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use stream_worker::{Delivery, StreamJob, StreamProcessor, StreamWorker, WorkerConfig};
//!
//! // 1. Define your job type
//! #[derive(Clone, Serialize, Deserialize)]
//! struct MyJob {
//!     id: String,
//!     payload: String,
//!     retry_count: u32,
//! }
//!
//! impl StreamJob for MyJob {
//!     fn job_id(&self) -> String { self.id.clone() }
//!     fn retry_count(&self) -> u32 { self.retry_count }
//!     fn with_retry(&self) -> Self {
//!         Self { retry_count: self.retry_count + 1, ..self.clone() }
//!     }
//! }
//!
//! // 2. Define your processor
//! struct MyProcessor;
//!
//! #[async_trait]
//! impl StreamProcessor<MyJob> for MyProcessor {
//!     async fn process(&self, delivery: &Delivery<MyJob>) -> Result<(), StreamError> {
//!         // Process the entry
//!         Ok(())
//!     }
//!     fn name(&self) -> &'static str { "MyProcessor" }
//! }
//!
//! // 3. Run the worker
//! let config = WorkerConfig::from_stream_def::<MyStreamDef>();
//! let worker = StreamWorker::new(redis, processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod connect;
mod consumer;
pub mod dlq;
mod error;
mod health;
pub mod metrics;
mod producer;
mod registry;
mod worker;

// Re-export all public types
pub use config::WorkerConfig;
pub use connect::{connect, connect_with_retry};
pub use consumer::{PendingEntry, StreamConsumer, StreamInfo};
pub use dlq::{DlqAnalysis, DlqEntry, DlqManager, DlqStats};
pub use error::{DlqCategory, StreamError};
pub use health::{
    dlq_admin_router,
    full_admin_router,
    health_handler,
    health_router,
    live_handler,
    metrics_handler,
    ready_handler,
    stream_info_handler,
    HealthState,
};
pub use producer::StreamProducer;
pub use registry::{Delivery, StreamDef, StreamJob, StreamProcessor};
pub use worker::StreamWorker;

/// Result type alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
