// Memory store seam.
//
// The key/value store holds all transient control-plane state: analyzer and
// worker records, tickets, and the per-worker event queues. The trait covers
// exactly the operations the agents need; production wires in Redis, the
// integration suite the in-memory store.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("memory store connect failed: {0}")]
    Connect(String),
    #[error("memory store command failed: {0}")]
    Command(String),
}

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Atomic set-if-absent. Returns `true` when the key was newly created,
    /// `false` when a value already existed. Ticket mutual exclusion hangs
    /// off this single operation.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Set only if the key already exists. Returns `false` (and writes
    /// nothing) for a missing key.
    async fn set_if_present(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StoreError>;

    /// Multi-get; the result is positionally aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// All keys matching a glob-style pattern (`*` wildcard).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Append to the tail of the list at `key`.
    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// List slice, inclusive on both ends, negative indices counting from
    /// the tail (`-1` is the last element).
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// Trim the list to the inclusive `[start, stop]` window; everything
    /// outside is removed. `start` past the end empties the list.
    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;
}
