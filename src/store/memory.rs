// In-memory implementation of the memory store seam.
//
// Single mutex over a map of string and list entries. List windowing
// follows Redis semantics (inclusive ranges, negative tail indices, trim
// past the end empties the list) because the event agent depends on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    List(Vec<String>),
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().expect("memory store poisoned")
    }
}

/// Normalize a Redis-style index against a list of `len` elements.
/// Negative indices count from the tail; the result is clamped to
/// `[0, len]` for `start`-like uses and `[-1, len-1]` handled by callers.
fn normalize(index: isize, len: usize) -> isize {
    if index < 0 {
        index + len as isize
    } else {
        index
    }
}

/// The inclusive `[start, stop]` window as a concrete `Range<usize>`,
/// empty when the window falls outside the list.
fn window(start: isize, stop: isize, len: usize) -> std::ops::Range<usize> {
    let start = normalize(start, len).max(0) as usize;
    let stop = normalize(stop, len);
    if stop < 0 || start >= len {
        return 0..0;
    }
    let stop = (stop as usize).min(len - 1);
    if start > stop {
        0..0
    } else {
        start..stop + 1
    }
}

/// Glob match with `*` wildcards, enough for the keyspace patterns the
/// agents use (`{typename}:anal:*`, `{typename}:worker:*:status`).
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part) && rest.len() >= part.len();
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with '*'.
    true
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.lock().get(key) {
            None => Ok(None),
            Some(Entry::Value(v)) => Ok(Some(v.clone())),
            Some(Entry::List(_)) => Err(StoreError::Command(format!("{key} holds a list"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), Entry::Value(value.to_string()));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut map = self.lock();
        if map.contains_key(key) {
            Ok(false)
        } else {
            map.insert(key.to_string(), Entry::Value(value.to_string()));
            Ok(true)
        }
    }

    async fn set_if_present(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut map = self.lock();
        if map.contains_key(key) {
            map.insert(key.to_string(), Entry::Value(value.to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StoreError> {
        let mut map = self.lock();
        for (key, value) in pairs {
            map.insert(key.clone(), Entry::Value(value.clone()));
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let map = self.lock();
        Ok(keys
            .iter()
            .map(|key| match map.get(key) {
                Some(Entry::Value(v)) => Some(v.clone()),
                _ => None,
            })
            .collect())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let map = self.lock();
        let mut keys: Vec<String> = map.keys().filter(|k| glob_match(pattern, k)).cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut map = self.lock();
        let mut removed = 0;
        for key in keys {
            if map.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.lock();
        match map.entry(key.to_string()).or_insert_with(|| Entry::List(Vec::new())) {
            Entry::List(items) => {
                items.push(value.to_string());
                Ok(())
            }
            Entry::Value(_) => Err(StoreError::Command(format!("{key} holds a plain value"))),
        }
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let map = self.lock();
        match map.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(items)) => Ok(items[window(start, stop, items.len())].to_vec()),
            Some(Entry::Value(_)) => Err(StoreError::Command(format!("{key} holds a plain value"))),
        }
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let mut map = self.lock();
        match map.get_mut(key) {
            None => Ok(()),
            Some(Entry::List(items)) => {
                let keep = window(start, stop, items.len());
                *items = items[keep].to_vec();
                if items.is_empty() {
                    map.remove(key);
                }
                Ok(())
            }
            Some(Entry::Value(_)) => Err(StoreError::Command(format!("{key} holds a plain value"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("ticket:a1", "first").await.unwrap());
        assert!(!store.set_if_absent("ticket:a1", "second").await.unwrap());
        assert_eq!(store.get("ticket:a1").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_set_if_present_refuses_missing_keys() {
        let store = MemoryStore::new();
        assert!(!store.set_if_present("hbeat", "1.0").await.unwrap());
        assert_eq!(store.get("hbeat").await.unwrap(), None);

        store.set("hbeat", "1.0").await.unwrap();
        assert!(store.set_if_present("hbeat", "2.0").await.unwrap());
        assert_eq!(store.get("hbeat").await.unwrap().as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn test_get_many_aligns_with_keys() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("c", "3").await.unwrap();
        let got = store
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some("1".to_string()), None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn test_scan_keys_glob() {
        let store = MemoryStore::new();
        store.set("tripwire:worker:w1:status", "ready").await.unwrap();
        store.set("tripwire:worker:w1:hbeat", "1.0").await.unwrap();
        store.set("tripwire:worker:w2:status", "running").await.unwrap();
        store.set("tripwire:anal:a1", "w1").await.unwrap();

        let statuses = store.scan_keys("tripwire:worker:*:status").await.unwrap();
        assert_eq!(statuses, vec!["tripwire:worker:w1:status", "tripwire:worker:w2:status"]);

        let bindings = store.scan_keys("tripwire:anal:*").await.unwrap();
        assert_eq!(bindings, vec!["tripwire:anal:a1"]);
    }

    #[tokio::test]
    async fn test_list_range_negative_indices() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c"] {
            store.push_back("q", v).await.unwrap();
        }
        assert_eq!(store.list_range("q", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.list_range("q", 1, 1).await.unwrap(), vec!["b"]);
        assert_eq!(store.list_range("q", -2, -1).await.unwrap(), vec!["b", "c"]);
        assert!(store.list_range("q", 5, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_trim_drops_consumed_prefix() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.push_back("q", v).await.unwrap();
        }
        // Consume three: keep [3, -1].
        store.list_trim("q", 3, -1).await.unwrap();
        assert_eq!(store.list_range("q", 0, -1).await.unwrap(), vec!["d"]);

        // Consume the remainder: start past the end empties the list.
        store.list_trim("q", 1, -1).await.unwrap();
        assert!(store.list_range("q", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_type_confusion_is_an_error() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.push_back("k", "x").await.is_err());

        store.push_back("q", "x").await.unwrap();
        assert!(store.get("q").await.is_err());
    }

    #[test]
    fn test_glob_match_edges() {
        assert!(glob_match("a:*", "a:b"));
        assert!(glob_match("a:*:status", "a:w1:status"));
        assert!(!glob_match("a:*:status", "a:w1:hbeat"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        // '*' must not double-count overlapping suffix text.
        assert!(!glob_match("a:*:status", "a::status-less"));
    }
}
