// Ticket agent — single-writer lock per analyzer.
//
// A ticket lives under `ticket:{analyzer_id}` for the duration of one write
// operation (start/stop). Creation is an atomic set-if-absent; whoever loses
// the race gets rejected with NOT_AVAILABLE upstream. No TTL: the brain
// deletes the ticket when the gated operation completes or fails.

use std::sync::Arc;

use crate::protocol::TicketContent;
use crate::store::{KeyValueStore, StoreError};

fn ticket_key(id: &str) -> String {
    format!("ticket:{id}")
}

pub struct TicketAgent {
    store: Arc<dyn KeyValueStore>,
}

impl TicketAgent {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The ticket content, or `None` when no write is in flight.
    pub async fn get(&self, id: &str) -> Result<Option<TicketContent>, StoreError> {
        let raw = match self.store.get(&ticket_key(id)).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let content = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Command(format!("corrupt ticket {id}: {e}")))?;
        Ok(Some(content))
    }

    /// Take the ticket. Returns `true` when newly created, `false` when a
    /// ticket for this analyzer already exists.
    pub async fn set(&self, id: &str, content: &TicketContent) -> Result<bool, StoreError> {
        let raw = serde_json::to_string(content)
            .map_err(|e| StoreError::Command(format!("unserializable ticket {id}: {e}")))?;
        self.store.set_if_absent(&ticket_key(id), &raw).await
    }

    /// Release the ticket. Returns how many tickets were removed (0 or 1).
    pub async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        self.store.delete(&[ticket_key(id)]).await
    }

    /// Batch write. Unlike `set` this overwrites unconditionally; callers
    /// use it for bulk re-seeding, not for mutual exclusion.
    pub async fn set_many(&self, entries: &[(String, TicketContent)]) -> Result<(), StoreError> {
        let mut pairs = Vec::with_capacity(entries.len());
        for (id, content) in entries {
            let raw = serde_json::to_string(content)
                .map_err(|e| StoreError::Command(format!("unserializable ticket {id}: {e}")))?;
            pairs.push((ticket_key(id), raw));
        }
        self.store.set_many(&pairs).await
    }

    /// Batch delete, returning how many tickets existed.
    pub async fn delete_many(&self, ids: &[String]) -> Result<u64, StoreError> {
        let keys: Vec<String> = ids.iter().map(|id| ticket_key(id)).collect();
        self.store.delete(&keys).await
    }
}
