//! In-memory durable store, for tests and for processes that only need a
//! snapshot shared between cache instances.

use super::{DurableStore, StoredRecord};
use crate::clock::Timestamp;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe record map. Clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    records: Arc<DashMap<String, (Timestamp, Vec<u8>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<StoredRecord> {
        self.records.get(key).map(|entry| {
            let (expires_at, payload) = entry.value();
            StoredRecord {
                key: key.to_string(),
                expires_at: *expires_at,
                payload: payload.clone(),
            }
        })
    }
}

impl DurableStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<StoredRecord>> {
        let records: Vec<StoredRecord> = self
            .records
            .iter()
            .map(|entry| StoredRecord {
                key: entry.key().clone(),
                expires_at: entry.value().0,
                payload: entry.value().1.clone(),
            })
            .collect();
        debug!("✓ InMemory LOAD {} records", records.len());
        Ok(records)
    }

    async fn save(&self, record: StoredRecord) -> Result<()> {
        debug!("✓ InMemory SAVE {} (expires at {})", record.key, record.expires_at);
        self.records
            .insert(record.key, (record.expires_at, record.payload));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        debug!("✓ InMemory REMOVE {}", key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        self.records.retain(|key, _| !key.starts_with(prefix));
        debug!("✓ InMemory REMOVE prefix {:?}", prefix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, expires_at: u64) -> StoredRecord {
        StoredRecord {
            key: key.to_string(),
            expires_at: Timestamp::from_millis(expires_at),
            payload: key.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let store = InMemoryStore::new();
        store.save(record("blog:1", 10)).await.unwrap();
        store.save(record("blog:2", 20)).await.unwrap();
        store.save(record("blog:1", 30)).await.unwrap();

        let mut loaded = store.load().await.unwrap();
        loaded.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(loaded, vec![record("blog:1", 30), record("blog:2", 20)]);

        store.remove("blog:1").await.unwrap();
        assert!(!store.contains_key("blog:1"));
        assert_eq!(store.get("blog:2"), Some(record("blog:2", 20)));
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let store = InMemoryStore::new();
        for key in ["brand:1", "brand:2", "blog"] {
            store.save(record(key, 1)).await.unwrap();
        }

        store.remove_prefix("brand").await.unwrap();
        assert_eq!(store.len(), 1);

        store.remove_prefix("").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.save(record("k", 1)).await.unwrap();
        assert!(other.contains_key("k"));
    }
}
