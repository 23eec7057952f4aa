//! Message Worker Service - Entry Point
//!
//! Background worker that processes inbound messages from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    message_worker::run().await
}
