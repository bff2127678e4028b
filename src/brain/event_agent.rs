// Event agent — drains per-worker event queues and persists events.
//
// The queue at `event:brain:{worker_id}` has one producer (the worker) and
// one consumer (the brain). The read-then-trim is not atomic, but trimming
// exactly the count read keeps concurrent tail appends safe: anything that
// lands after the read survives the trim.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::eventdb::{EventDbError, EventStore, StoredEvent};
use crate::protocol::subjects::event_queue_key;
use crate::protocol::WorkerEvent;
use crate::store::{KeyValueStore, StoreError};

pub struct EventAgent {
    store: Arc<dyn KeyValueStore>,
    event_db: Arc<dyn EventStore>,
}

impl EventAgent {
    pub fn new(store: Arc<dyn KeyValueStore>, event_db: Arc<dyn EventStore>) -> Self {
        Self { store, event_db }
    }

    /// Drain the worker's queue: read everything, trim off exactly what was
    /// read, decode. Entries that fail to decode are dropped individually.
    pub async fn consume_from_worker(&self, worker_id: &str) -> Result<Vec<WorkerEvent>, StoreError> {
        let key = event_queue_key(worker_id);
        let raw_events = self.store.list_range(&key, 0, -1).await?;
        if raw_events.is_empty() {
            return Ok(Vec::new());
        }
        // Trim only the prefix actually read; the producer may have appended
        // more behind it.
        self.store.list_trim(&key, raw_events.len() as isize, -1).await?;

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            match serde_json::from_str::<WorkerEvent>(raw) {
                Ok(event) => events.push(event),
                Err(e) => error!(worker_id, error = %e, "dropping undecodable event"),
            }
        }
        Ok(events)
    }

    /// Validate and persist events for an analyzer. Invalid events are
    /// dropped one by one; the rest are written as content documents plus
    /// base index documents carrying the analyzer id and a derived date.
    /// Returns the events that made it to the store.
    pub async fn save_events(
        &self,
        events: &[WorkerEvent],
        analyzer_id: &str,
    ) -> Result<Vec<WorkerEvent>, EventDbError> {
        let mut valid = Vec::with_capacity(events.len());
        for event in events {
            match event.validate() {
                Ok(()) => valid.push(event.clone()),
                Err(reason) => error!(analyzer_id, %reason, "dropping schema-invalid event"),
            }
        }
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let contents: Vec<Value> = valid.iter().map(|e| e.content.clone()).collect();
        let content_ids = self.event_db.insert_contents(contents).await?;

        let stored: Vec<StoredEvent> = valid
            .iter()
            .zip(&content_ids)
            .map(|(event, content_id)| StoredEvent {
                analyzer_id: analyzer_id.to_string(),
                timestamp: event.timestamp,
                kind: event.kind.clone(),
                app_name: event.app_name.clone(),
                content: content_id.clone(),
                date: timestamp_to_date(event.timestamp),
            })
            .collect();
        self.event_db.insert_events(stored).await?;

        debug!(analyzer_id, count = valid.len(), "persisted events");
        Ok(valid)
    }
}

fn timestamp_to_date(timestamp: f64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis((timestamp * 1000.0) as i64).unwrap_or_default()
}
