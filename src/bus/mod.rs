// Message bus seam.
//
// The brain and worker are handed an `Arc<dyn MessageBus>`; production wires
// in NATS, the integration suite wires in the in-process bus. Subjects are
// plain strings, replies travel as a subject name alongside the payload.

pub mod memory;
pub mod nats;

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub use memory::MemoryBus;
pub use nats::NatsBus;

/// One delivered message.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    /// Reply subject for request/reply traffic, absent on plain publishes.
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Stream of messages for one subscription. Ends when the bus connection
/// closes or the subscription is dropped server-side.
pub type MessageStream = Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(String),
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subscribe to {subject} failed: {reason}")]
    Subscribe { subject: String, reason: String },
}

#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;

    /// Publish with a reply subject attached, for request/reply traffic.
    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<(), BusError>;

    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError>;

    /// Flush buffered publishes. Meaningful for real bus clients; the
    /// in-process bus delivers synchronously and treats this as a no-op.
    async fn flush(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Serialize a message and publish it, logging a failed publish instead of
/// propagating it. Transient bus failures are log-and-drop by contract; the
/// liveness sweep catches anything that stays wedged.
pub(crate) async fn publish_json<T: serde::Serialize>(bus: &dyn MessageBus, subject: &str, msg: &T) {
    let payload = match serde_json::to_vec(msg) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            tracing::error!(subject, error = %e, "failed to serialize outbound message");
            return;
        }
    };
    if let Err(e) = bus.publish(subject, payload).await {
        tracing::warn!(subject, error = %e, "dropped outbound message");
    }
}
