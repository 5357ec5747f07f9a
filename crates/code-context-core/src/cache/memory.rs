//! In-memory [`KvStore`] with lazy expiry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use super::KvStore;

struct Entry {
    value: String,
    /// `None` when the TTL does not fit in an `Instant`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local key/value store. Expired entries are dropped on access.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match guard.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            guard.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(Duration::from_secs(ttl_secs)),
        };
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.remove(key).is_some())
    }

    async fn scan_and_delete(&self, prefix: &str) -> Result<usize> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|k, _| !k.starts_with(prefix));
        Ok(before - guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = MemoryKvStore::new();
        store.set("k", "v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryKvStore::new();
        store.set("k", "v", u64::MAX).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryKvStore::new();
        store.set("k", "a", 60).await.unwrap();
        store.set("k", "b", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_and_delete_prefix_only() {
        let store = MemoryKvStore::new();
        store.set("rag:query:aaaa:1", "x", 60).await.unwrap();
        store.set("rag:query:aaaa:2", "x", 60).await.unwrap();
        store.set("rag:query:bbbb:1", "x", 60).await.unwrap();
        assert_eq!(store.scan_and_delete("rag:query:aaaa:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }
}
