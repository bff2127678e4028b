// NATS adapter for the message bus seam.

use async_nats::Client;
use bytes::Bytes;
use futures::StreamExt;

use super::{BusError, BusMessage, MessageBus, MessageStream};

/// Message bus backed by a NATS server.
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(format!("{url}: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish { subject: subject.to_string(), reason: e.to_string() })
    }

    async fn publish_with_reply(&self, subject: &str, reply: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish { subject: subject.to_string(), reason: e.to_string() })
    }

    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe { subject: subject.to_string(), reason: e.to_string() })?;
        Ok(Box::pin(subscriber.map(|msg| BusMessage {
            subject: msg.subject.to_string(),
            reply: msg.reply.map(|r| r.to_string()),
            payload: msg.payload,
        })))
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish { subject: "<flush>".to_string(), reason: e.to_string() })
    }
}
