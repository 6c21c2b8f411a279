//! Coalescing cache manager - main entry point for cache operations.

use crate::builder::FetchBuilder;
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::key::is_in_family;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::store::{CacheEntry, CacheStore};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Shared outcome every waiter of one production awaits.
type Outcome<V> = Shared<BoxFuture<'static, Result<V>>>;

/// A production that has been launched and not yet settled.
struct InFlight<V> {
    generation: u64,
    outcome: Outcome<V>,
    waiters: usize,
}

struct State<V> {
    store: CacheStore<V>,
    in_flight: HashMap<String, InFlight<V>>,
    next_generation: u64,
}

/// Scope of an explicit invalidation, as reported to an [`EntryListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(String),
    Prefix(String),
    Family(String),
    All,
}

/// Observer of entries written to and dropped from the store.
///
/// Called while the manager's lock is held, so events arrive in the order
/// they were applied. Implementations must not block and must not call back
/// into the manager.
pub trait EntryListener<V>: Send + Sync {
    /// A current production was stored.
    fn on_store(&self, key: &str, value: &V, expires_at: Timestamp);

    /// Entries were explicitly invalidated.
    fn on_invalidate(&self, _scope: &Invalidation) {}
}

/// Async response cache that runs at most one producer per key at a time.
///
/// - A valid entry is returned immediately.
/// - Concurrent callers for a missing or expired key share one production.
/// - Only the key's current production may write the store; one that was
///   superseded by [`invalidate`](Self::invalidate) still resolves its own
///   waiters but is otherwise discarded.
/// - Failures reach every waiter and are never cached.
///
/// Cloning is cheap and every clone shares the same cache. Productions run
/// on spawned tasks, so the manager must be used inside a Tokio runtime.
/// Productions cannot be cancelled and have no built-in deadline: wrap slow
/// producers in `tokio::time::timeout` if callers must not wait forever.
///
/// # Example
///
/// ```no_run
/// # use coalesce_kit::{CoalescingCacheManager, error::Result};
/// # use std::time::Duration;
/// # async fn example() -> Result<()> {
/// let cache: CoalescingCacheManager<Vec<String>> = CoalescingCacheManager::new();
///
/// let brands = cache
///     .get("brands", || async { Ok(vec!["Acme".to_string()]) }, Duration::from_secs(300))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct CoalescingCacheManager<V> {
    state: Arc<Mutex<State<V>>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn CacheMetrics>,
    ttl_policy: Arc<TtlPolicy>,
    listener: Arc<RwLock<Option<Arc<dyn EntryListener<V>>>>>,
}

impl<V> Clone for CoalescingCacheManager<V> {
    fn clone(&self) -> Self {
        CoalescingCacheManager {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            ttl_policy: Arc::clone(&self.ttl_policy),
            listener: Arc::clone(&self.listener),
        }
    }
}

impl<V> CoalescingCacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a manager with the default configuration.
    pub fn new() -> Self {
        Self::build(CacheConfig::default())
    }

    /// Create a manager from a validated configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        CoalescingCacheManager {
            state: Arc::new(Mutex::new(State {
                store: CacheStore::new(config.max_entries),
                in_flight: HashMap::new(),
                next_generation: 0,
            })),
            clock: Arc::new(SystemClock::new()),
            metrics: Arc::new(NoOpMetrics),
            ttl_policy: Arc::new(config.ttl_policy),
            listener: Arc::new(RwLock::new(None)),
        }
    }

    /// Set a custom time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the TTL policy used by [`get_with_policy`](Self::get_with_policy)
    /// and by [`FetchBuilder`] when no TTL is given.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = Arc::new(policy);
        self
    }

    /// Install the store/invalidation observer, returning the previous one.
    pub fn set_listener(
        &self,
        listener: Arc<dyn EntryListener<V>>,
    ) -> Option<Arc<dyn EntryListener<V>>> {
        let mut slot = self.listener.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(listener)
    }

    /// Create a builder for a single fetch with a strategy and TTL override.
    pub fn fetch(&self, key: impl Into<String>) -> FetchBuilder<'_, V> {
        FetchBuilder::new(self, key.into())
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// Return the value for `key`, producing it at most once across all
    /// concurrent callers.
    ///
    /// `producer` is invoked only when there is neither a valid entry nor a
    /// production in flight for `key`. A successful result stays valid for
    /// `ttl` from completion; a zero `ttl` resolves the waiters without
    /// storing anything.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, unchanged, to every coalesced caller.
    /// A panicking producer surfaces as `Error::ProductionAborted`.
    pub async fn get<F, Fut>(&self, key: impl Into<String>, producer: F, ttl: Duration) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let key = key.into();
        let timer = Instant::now();

        let (outcome, launch) = {
            let mut state = self.lock_state();

            let hit = state.store.get(&key, self.clock.now()).cloned();
            if let Some(value) = hit {
                drop(state);
                debug!("✓ Cache hit for {}", key);
                self.metrics.record_hit(&key, timer.elapsed());
                return Ok(value);
            }

            match state.in_flight.get_mut(&key) {
                Some(flight) => {
                    flight.waiters += 1;
                    debug!(
                        "» Joining production for {} (generation {}, {} waiters)",
                        key, flight.generation, flight.waiters
                    );
                    (flight.outcome.clone(), None)
                }
                None => {
                    state.next_generation += 1;
                    let generation = state.next_generation;
                    let (tx, rx) = oneshot::channel::<Result<V>>();
                    let outcome = async move {
                        rx.await.unwrap_or_else(|_| {
                            Err(Error::ProductionAborted(
                                "production task dropped before settling".to_string(),
                            ))
                        })
                    }
                    .boxed()
                    .shared();

                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            generation,
                            outcome: outcome.clone(),
                            waiters: 1,
                        },
                    );
                    debug!("» Launching production for {} (generation {})", key, generation);
                    (outcome, Some((generation, tx)))
                }
            }
        };

        match launch {
            Some((generation, tx)) => self.launch(key.clone(), generation, producer, ttl, tx),
            None => self.metrics.record_coalesced(&key),
        }

        let result = outcome.await;
        match &result {
            Ok(_) => self.metrics.record_miss(&key, timer.elapsed()),
            Err(e) => self.metrics.record_error(&key, &e.to_string()),
        }
        result
    }

    /// [`get`](Self::get) with the TTL taken from the configured policy.
    pub async fn get_with_policy<F, Fut>(&self, key: impl Into<String>, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let key = key.into();
        let ttl = self.ttl_policy.get_ttl(&key);
        self.get(key, producer, ttl).await
    }

    /// Return a valid cached value without ever producing. Counts as an access.
    pub fn get_cached(&self, key: &str) -> Option<V> {
        let hit = self.lock_state().store.get(key, self.clock.now()).cloned();
        if hit.is_some() {
            self.metrics.record_hit(key, Duration::ZERO);
        }
        hit
    }

    /// Inspect the stored entry for `key`, valid or not, without touching it.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock_state().store.peek(key).cloned()
    }

    /// Whether a production is currently attached to `key`.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock_state().in_flight.contains_key(key)
    }

    /// Drop the entry for `key` and detach any production in flight for it.
    ///
    /// The detached production keeps running and still resolves the callers
    /// that joined it, but it can no longer write the store. The next caller
    /// starts a new production. Returns whether anything was dropped.
    pub fn invalidate(&self, key: &str) -> bool {
        let (removed, detached) = {
            let mut state = self.lock_state();
            let outcome = (
                state.store.remove(key).is_some(),
                state.in_flight.remove(key).is_some(),
            );
            self.notify(&Invalidation::Key(key.to_string()));
            outcome
        };

        debug!(
            "Invalidated {} (entry removed: {}, production detached: {})",
            key, removed, detached
        );
        removed || detached
    }

    /// Invalidate every key that starts with `prefix`. Returns the number of
    /// stored entries removed.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let removed = self.invalidate_where(Invalidation::Prefix(prefix.to_string()), |key| {
            key.starts_with(prefix)
        });
        debug!("Invalidated {} entries with prefix {:?}", removed, prefix);
        removed
    }

    /// Invalidate a key family built by [`crate::key::CacheKeyBuilder`]: the
    /// family key itself and every key continuing it with `:` or `?`.
    pub fn invalidate_family(&self, family: &str) -> usize {
        let removed = self.invalidate_where(Invalidation::Family(family.to_string()), |key| {
            is_in_family(key, family)
        });
        debug!("Invalidated {} entries in family {:?}", removed, family);
        removed
    }

    /// Drop every entry and detach every production.
    pub fn clear(&self) {
        {
            let mut state = self.lock_state();
            state.store.clear();
            state.in_flight.clear();
            self.notify(&Invalidation::All);
        }
        info!("Cache cleared");
    }

    /// Remove expired entries eagerly. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.lock_state().store.purge_expired(now).len()
    }

    /// Number of stored entries, valid or expired.
    pub fn len(&self) -> usize {
        self.lock_state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().store.is_empty()
    }

    /// Stored keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lock_state().store.keys()
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Insert a value restored from elsewhere (a durable snapshot).
    ///
    /// Skipped when the key already has an entry or a production in flight,
    /// or when `expires_at` is not in the future.
    pub(crate) fn seed(&self, key: String, value: V, expires_at: Timestamp) -> bool {
        let now = self.clock.now();
        if expires_at <= now {
            return false;
        }

        let evicted = {
            let mut state = self.lock_state();
            if state.store.contains_key(&key) || state.in_flight.contains_key(&key) {
                return false;
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            state.store.insert(key, value, expires_at, generation, now)
        };

        if let Some(evicted) = evicted {
            self.report_eviction(&evicted);
        }
        true
    }

    fn invalidate_where<P>(&self, scope: Invalidation, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let mut state = self.lock_state();
        state.in_flight.retain(|key, _| !predicate(key));
        let removed = state.store.remove_where(|key, _| predicate(key)).len();
        self.notify(&scope);
        removed
    }

    fn launch<F, Fut>(
        &self,
        key: String,
        generation: u64,
        producer: F,
        ttl: Duration,
        tx: oneshot::Sender<Result<V>>,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let production: BoxFuture<'static, Result<V>> =
            match std::panic::catch_unwind(AssertUnwindSafe(producer)) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .map(|outcome| outcome.unwrap_or_else(|panic| Err(aborted(panic))))
                    .boxed(),
                Err(panic) => futures::future::ready(Err(aborted(panic))).boxed(),
            };

        let cache = self.clone();
        tokio::spawn(async move {
            let result = production.await;
            cache.settle(&key, generation, &result, ttl);
            // every waiter may have gone away; the store is already settled
            let _ = tx.send(result);
        });
    }

    /// Apply a finished production to the store.
    fn settle(&self, key: &str, generation: u64, result: &Result<V>, ttl: Duration) {
        let listener = self.listener();
        let mut evicted = None;
        let mut stale = false;

        {
            let mut state = self.lock_state();
            let is_current = state
                .in_flight
                .get(key)
                .is_some_and(|flight| flight.generation == generation);
            let waiters = if is_current {
                state.in_flight.remove(key).map_or(0, |flight| flight.waiters)
            } else {
                0
            };

            match result {
                Ok(_) if is_current && ttl.is_zero() => {
                    state.store.remove(key);
                    debug!("Not storing {} (zero ttl, {} waiters)", key, waiters);
                }
                Ok(value) if is_current => {
                    let now = self.clock.now();
                    let expires_at = now.saturating_add(ttl);
                    evicted = state.store.insert(
                        key.to_string(),
                        value.clone(),
                        expires_at,
                        generation,
                        now,
                    );
                    if let Some(listener) = &listener {
                        listener.on_store(key, value, expires_at);
                    }
                    debug!(
                        "✓ Stored {} (generation {}, ttl {:?}, {} waiters)",
                        key, generation, ttl, waiters
                    );
                }
                Ok(_) => {
                    stale = true;
                    debug!(
                        "Discarding superseded production for {} (generation {})",
                        key, generation
                    );
                }
                Err(e) if is_current => {
                    state.store.remove(key);
                    warn!("✗ Production for {} failed ({} waiters): {}", key, waiters, e);
                }
                Err(e) => {
                    debug!(
                        "Superseded production for {} (generation {}) failed: {}",
                        key, generation, e
                    );
                }
            }
        }

        if let Some(evicted) = evicted {
            self.report_eviction(&evicted);
        }
        if stale {
            self.metrics.record_stale_discard(key);
        }
    }

    fn report_eviction(&self, key: &str) {
        debug!("Evicted {} to stay within capacity", key);
        self.metrics.record_eviction(key);
    }

    fn notify(&self, scope: &Invalidation) {
        if let Some(listener) = self.listener() {
            listener.on_invalidate(scope);
        }
    }

    fn listener(&self) -> Option<Arc<dyn EntryListener<V>>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for CoalescingCacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn aborted(panic: Box<dyn Any + Send>) -> Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "producer panicked".to_string());
    Error::ProductionAborted(message)
}
