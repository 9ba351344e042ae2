use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::BackendError;

use super::{RecordStore, PONG};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process record store with per-key expiry. Useful for tests and single-node demos.
#[derive(Default)]
pub struct MemoryRecordStore {
    entries: DashMap<String, Entry>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.ttl(key).is_some()
    }

    /// Live keys currently stored, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.expires_at > now)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<String, BackendError> {
        Ok(PONG.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryRecordStore::new();
        store.set("k", b"v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.ttl("k").unwrap() <= Duration::from_secs(60));
        assert_eq!(store.len(), 1);

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Deleting again is fine.
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent() {
        let store = MemoryRecordStore::new();
        store.set("gone", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("gone").await.unwrap(), None);
        assert!(!store.contains_key("gone"));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_ping() {
        assert_eq!(MemoryRecordStore::new().ping().await.unwrap(), PONG);
    }
}
