//! Messaging domain: the canonical inbound event and everything needed to
//! admit it into the processing stream.
//!
//! - [`models`]: canonical `InboundMessage`, contact/media records, message
//!   kinds with their priorities and lock TTLs
//! - [`parser`]: gateway (Evolution API) webhook payload parsing
//! - [`signature`]: webhook HMAC-SHA256 validation
//! - [`state`]: per-conversation last-timestamp marker and short-lived lock
//! - [`idempotency`]: TTL-bounded set of observed gateway message IDs
//! - [`stream_models`]: the job that flows through `messages:stream`
//! - [`streams`]: stream definitions (names, group, DLQ)

pub mod error;
pub mod idempotency;
pub mod models;
pub mod parser;
pub mod signature;
pub mod state;
pub mod stream_models;
pub mod streams;

pub use error::MessagingError;
pub use idempotency::IdempotencyStore;
pub use models::{Contact, InboundMessage, MediaInfo, MessageKind};
pub use parser::parse_webhook_payload;
pub use signature::verify_webhook_signature;
pub use state::ConversationStateStore;
pub use stream_models::ProcessingJob;
pub use streams::MessageStream;
