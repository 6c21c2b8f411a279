//! Best-effort write-through persistence for a [`CoalescingCacheManager`].
//!
//! The in-memory manager stays the source of truth. Stored entries are copied
//! to a [`DurableStore`] and restored from it on [`PersistedCacheAdapter::open`],
//! so a restarted process starts warm. Durable failures are logged and never
//! reach callers.

use crate::backend::{DurableStore, StoredRecord};
use crate::builder::FetchBuilder;
use crate::clock::Timestamp;
use crate::entity::CacheEntity;
use crate::error::Result;
use crate::key::{PARAMS_SEPARATOR, SEGMENT_SEPARATOR};
use crate::manager::{CoalescingCacheManager, EntryListener, Invalidation};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Durable operation queued for the writer task.
enum WriteOp {
    Save(StoredRecord),
    Remove(String),
    RemovePrefix(String),
    Flush(oneshot::Sender<()>),
}

/// Listener that turns store and invalidation events into queued writes.
///
/// Events are queued while the manager holds its lock, and a single writer
/// task applies them in queue order. The durable store therefore sees a save
/// and an invalidation of one key in the order the cache applied them.
struct WriteThrough<V> {
    queue: mpsc::UnboundedSender<WriteOp>,
    _value: PhantomData<fn(V)>,
}

impl<V> WriteThrough<V> {
    fn enqueue(&self, op: WriteOp) {
        if self.queue.send(op).is_err() {
            warn!("Durable writer stopped; dropping persisted write");
        }
    }
}

impl<V: CacheEntity> EntryListener<V> for WriteThrough<V> {
    fn on_store(&self, key: &str, value: &V, expires_at: Timestamp) {
        match value.serialize_for_cache() {
            Ok(payload) => self.enqueue(WriteOp::Save(StoredRecord {
                key: key.to_string(),
                expires_at,
                payload,
            })),
            Err(e) => warn!("✗ Not persisting {}: {}", key, e),
        }
    }

    fn on_invalidate(&self, scope: &Invalidation) {
        match scope {
            Invalidation::Key(key) => self.enqueue(WriteOp::Remove(key.clone())),
            Invalidation::Prefix(prefix) => self.enqueue(WriteOp::RemovePrefix(prefix.clone())),
            Invalidation::Family(family) => {
                self.enqueue(WriteOp::Remove(family.clone()));
                self.enqueue(WriteOp::RemovePrefix(format!("{}{}", family, SEGMENT_SEPARATOR)));
                self.enqueue(WriteOp::RemovePrefix(format!("{}{}", family, PARAMS_SEPARATOR)));
            }
            Invalidation::All => self.enqueue(WriteOp::RemovePrefix(String::new())),
        }
    }
}

async fn run_writer<S: DurableStore>(store: Arc<S>, mut queue: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = queue.recv().await {
        let outcome = match op {
            WriteOp::Save(record) => {
                let key = record.key.clone();
                store.save(record).await.map_err(|e| (key, e))
            }
            WriteOp::Remove(key) => store.remove(&key).await.map_err(|e| (key, e)),
            WriteOp::RemovePrefix(prefix) => store
                .remove_prefix(&prefix)
                .await
                .map_err(|e| (format!("{}*", prefix), e)),
            WriteOp::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
        };

        if let Err((target, e)) = outcome {
            warn!("✗ Durable write for {} failed: {}", target, e);
        }
    }
    debug!("Durable writer finished");
}

/// Outcome of restoring a snapshot into the cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub expired: usize,
    pub skipped: usize,
}

/// A [`CoalescingCacheManager`] whose stored entries survive restarts.
///
/// # Example
///
/// ```no_run
/// # use coalesce_kit::{CoalescingCacheManager, PersistedCacheAdapter};
/// # use coalesce_kit::backend::FileStore;
/// # use coalesce_kit::error::Result;
/// # use std::time::Duration;
/// # async fn example() -> Result<()> {
/// let cache: CoalescingCacheManager<Vec<String>> = CoalescingCacheManager::new();
/// let persisted = PersistedCacheAdapter::open(cache, FileStore::at("blog.json")).await;
///
/// let titles = persisted
///     .get("blog", || async { Ok(vec!["Hello".to_string()]) }, Duration::from_secs(3600))
///     .await?;
/// persisted.flush().await;
/// # Ok(())
/// # }
/// ```
pub struct PersistedCacheAdapter<V, S> {
    cache: CoalescingCacheManager<V>,
    store: Arc<S>,
    queue: mpsc::UnboundedSender<WriteOp>,
    restored: RestoreReport,
}

impl<V, S> Clone for PersistedCacheAdapter<V, S> {
    fn clone(&self) -> Self {
        PersistedCacheAdapter {
            cache: self.cache.clone(),
            store: Arc::clone(&self.store),
            queue: self.queue.clone(),
            restored: self.restored,
        }
    }
}

impl<V, S> PersistedCacheAdapter<V, S>
where
    V: CacheEntity,
    S: DurableStore,
{
    /// Restore unexpired records from `store` into `cache`, then start
    /// writing stored entries and invalidations through to it.
    ///
    /// Never fails: an unreadable store is logged and the cache starts cold.
    /// Records that are expired, undecodable or fail validation are dropped
    /// from the store.
    pub async fn open(cache: CoalescingCacheManager<V>, store: S) -> Self {
        let store = Arc::new(store);
        let restored = Self::restore(&cache, store.as_ref()).await;

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&store), rx));

        let listener = WriteThrough::<V> {
            queue: queue.clone(),
            _value: PhantomData,
        };
        if cache.set_listener(Arc::new(listener)).is_some() {
            warn!("Replaced an existing entry listener with the durable writer");
        }

        PersistedCacheAdapter {
            cache,
            store,
            queue,
            restored,
        }
    }

    async fn restore(cache: &CoalescingCacheManager<V>, store: &S) -> RestoreReport {
        let records = match store.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!("✗ Could not load durable snapshot, starting cold: {}", e);
                return RestoreReport::default();
            }
        };

        let now = cache.now();
        let mut report = RestoreReport::default();
        let mut dead = Vec::new();

        for record in records {
            if record.expires_at <= now {
                report.expired += 1;
                dead.push(record.key);
                continue;
            }

            let value = V::deserialize_from_cache(&record.payload)
                .and_then(|value| value.validate().map(|_| value));
            match value {
                Ok(value) => {
                    if cache.seed(record.key, value, record.expires_at) {
                        report.restored += 1;
                    }
                }
                Err(e) => {
                    warn!("✗ Skipping persisted entry {}: {}", record.key, e);
                    report.skipped += 1;
                    dead.push(record.key);
                }
            }
        }

        for key in dead {
            if let Err(e) = store.remove(&key).await {
                debug!("Could not prune persisted entry {}: {}", key, e);
            }
        }

        info!(
            "✓ Restored {} cache entries ({} expired, {} skipped)",
            report.restored, report.expired, report.skipped
        );
        report
    }

    /// See [`CoalescingCacheManager::get`].
    pub async fn get<F, Fut>(&self, key: impl Into<String>, producer: F, ttl: Duration) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.cache.get(key, producer, ttl).await
    }

    pub fn fetch(&self, key: impl Into<String>) -> FetchBuilder<'_, V> {
        self.cache.fetch(key)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.invalidate(key)
    }

    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        self.cache.invalidate_by_prefix(prefix)
    }

    pub fn invalidate_family(&self, family: &str) -> usize {
        self.cache.invalidate_family(family)
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    /// Wait until every durable write queued so far has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(WriteOp::Flush(tx)).is_err() || rx.await.is_err() {
            warn!("Durable writer stopped before flush completed");
        }
    }

    /// The wrapped in-memory manager.
    pub fn cache(&self) -> &CoalescingCacheManager<V> {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// What [`open`](Self::open) restored.
    pub fn restored(&self) -> RestoreReport {
        self.restored
    }
}
