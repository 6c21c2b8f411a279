//! Durable key-value stores behind [`crate::persisted::PersistedCacheAdapter`].
//!
//! Every operation is best-effort from the cache's point of view: the adapter
//! logs failures and carries on with the in-memory cache.

use crate::clock::Timestamp;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "inmemory")]
pub mod memory;

#[cfg(feature = "file")]
pub use file::{FileStore, FileStoreConfig};
#[cfg(feature = "inmemory")]
pub use memory::InMemoryStore;

/// One persisted entry: an encoded value and the instant it stops being valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub expires_at: Timestamp,
    /// Value encoded with [`crate::CacheEntity::serialize_for_cache`].
    pub payload: Vec<u8>,
}

/// Durable storage for cache snapshots.
pub trait DurableStore: Send + Sync + 'static {
    /// Every record currently stored, expired or not.
    fn load(&self) -> impl Future<Output = Result<Vec<StoredRecord>>> + Send;

    /// Insert or replace the record for `record.key`.
    fn save(&self, record: StoredRecord) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every record whose key starts with `prefix` (all of them for "").
    fn remove_prefix(&self, prefix: &str) -> impl Future<Output = Result<()>> + Send;
}
