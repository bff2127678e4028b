// In-memory implementation of the event store seam.

use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::{EventDbError, EventStore, StoredEvent};

#[derive(Default, Clone)]
pub struct MemoryEventStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    contents: Vec<Value>,
    events: Vec<StoredEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored base events, in insertion order.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.inner.lock().expect("event store poisoned").events.clone()
    }

    /// Snapshot of the stored content documents, in insertion order.
    pub fn contents(&self) -> Vec<Value> {
        self.inner.lock().expect("event store poisoned").contents.clone()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_contents(&self, contents: Vec<Value>) -> Result<Vec<String>, EventDbError> {
        let mut inner = self.inner.lock().expect("event store poisoned");
        let mut ids = Vec::with_capacity(contents.len());
        for content in contents {
            ids.push(format!("content-{}", inner.contents.len()));
            inner.contents.push(content);
        }
        Ok(ids)
    }

    async fn insert_events(&self, events: Vec<StoredEvent>) -> Result<(), EventDbError> {
        self.inner.lock().expect("event store poisoned").events.extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_content_ids_are_returned_in_order() {
        let store = MemoryEventStore::new();
        let ids = store
            .insert_contents(vec![json!({"n": 1}), json!({"n": 2})])
            .await
            .unwrap();
        assert_eq!(ids, vec!["content-0", "content-1"]);

        let more = store.insert_contents(vec![json!({"n": 3})]).await.unwrap();
        assert_eq!(more, vec!["content-2"]);
        assert_eq!(store.contents().len(), 3);
    }
}
