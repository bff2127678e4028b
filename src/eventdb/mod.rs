// Persistent event store seam.
//
// Two collections per brain: a per-typename content collection holding the
// raw event payloads, and a base index collection referencing them. The
// brain is the only writer.

pub mod memory;
pub mod mongo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::MemoryEventStore;
pub use mongo::MongoEventStore;

/// Base index document written for every persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(rename = "analyzerId")]
    pub analyzer_id: String,
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    /// Id of the content document in the per-typename collection.
    pub content: String,
    /// Calendar form of `timestamp`, for date-range queries.
    pub date: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum EventDbError {
    #[error("event store connect failed: {0}")]
    Connect(String),
    #[error("event store insert failed: {0}")]
    Insert(String),
}

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Insert raw content documents, returning their ids in input order.
    async fn insert_contents(&self, contents: Vec<Value>) -> Result<Vec<String>, EventDbError>;

    /// Insert base index documents.
    async fn insert_events(&self, events: Vec<StoredEvent>) -> Result<(), EventDbError>;
}
