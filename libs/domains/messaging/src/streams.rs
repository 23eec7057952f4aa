//! Stream definitions for the messaging domain.

use stream_worker::StreamDef;

/// Primary inbound message stream.
///
/// The webhook API publishes admitted messages here with the gateway
/// message ID as the stream ID; pipeline workers consume them through the
/// `processors` group.
pub struct MessageStream;

impl StreamDef for MessageStream {
    /// Stream name for inbound messages.
    const STREAM_NAME: &'static str = "messages:stream";

    /// Consumer group shared by all pipeline workers.
    const CONSUMER_GROUP: &'static str = "processors";

    /// Dead letter queue for exhausted or non-retryable entries.
    const DLQ_STREAM: &'static str = "messages:stream:dlq";

    /// Soft cap before approximate trimming.
    const MAX_LENGTH: i64 = 10_000;

    /// Entries idle longer than this may be claimed by another worker.
    const AUTO_CLAIM_IDLE_MS: u64 = 300_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_stream_def() {
        assert_eq!(MessageStream::STREAM_NAME, "messages:stream");
        assert_eq!(MessageStream::CONSUMER_GROUP, "processors");
        assert_eq!(MessageStream::DLQ_STREAM, "messages:stream:dlq");
        assert_eq!(MessageStream::MAX_LENGTH, 10_000);
        assert_eq!(MessageStream::AUTO_CLAIM_IDLE_MS, 300_000);
    }
}
