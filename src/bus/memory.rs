// In-process message bus.
//
// Subject → subscriber fan-out over unbounded channels. Used by the
// integration suite and local development; delivery is synchronous with
// publish, which makes test orderings deterministic per subject.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{BusError, BusMessage, MessageBus, MessageStream};

#[derive(Default, Clone)]
pub struct MemoryBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anyone is currently subscribed to `subject`. Lets tests wait
    /// for a component's subscriptions instead of sleeping.
    pub fn has_subscribers(&self, subject: &str) -> bool {
        self.subscribers
            .lock()
            .expect("bus registry poisoned")
            .get(subject)
            .map(|subs| subs.iter().any(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    fn deliver(&self, msg: BusMessage) {
        let mut registry = self.subscribers.lock().expect("bus registry poisoned");
        if let Some(subs) = registry.get_mut(&msg.subject) {
            subs.retain(|tx| tx.send(msg.clone()).is_ok());
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.deliver(BusMessage { subject: subject.to_string(), reply: None, payload });
        Ok(())
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<(), BusError> {
        self.deliver(BusMessage {
            subject: subject.to_string(),
            reply: Some(reply.to_string()),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("bus registry poisoned")
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
