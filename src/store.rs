//! Bounded in-memory entry table with LRU eviction.
//!
//! Recency is tracked by [`lru::LruCache`]. When an insert would exceed
//! `max_entries`, the least recently accessed expired entry goes first; the
//! least recently accessed valid entry is evicted only when nothing has
//! expired.

use crate::clock::Timestamp;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Default capacity, sized for page-level key cardinality.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// A stored production result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Last successfully produced value.
    pub value: V,
    /// Completion time plus TTL. Valid while `now < expires_at`.
    pub expires_at: Timestamp,
    /// Generation of the production that wrote this entry.
    pub generation: u64,
    /// Updated on every read; drives eviction.
    pub last_accessed: Timestamp,
}

impl<V> CacheEntry<V> {
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// Key to entry table bounded by `max_entries`.
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: LruCache<String, CacheEntry<V>>,
    max_entries: usize,
}

impl<V> CacheStore<V> {
    /// Create a store holding at most `max_entries` (at least one).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        CacheStore {
            entries: LruCache::new(capacity),
            max_entries: capacity.get(),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the value if the entry is still valid, marking it most recently
    /// used. Expired entries stay in place until replaced or evicted.
    pub fn get(&mut self, key: &str, now: Timestamp) -> Option<&V> {
        if !self.entries.peek(key)?.is_valid(now) {
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(&entry.value)
    }

    /// Inspect an entry without touching recency or validity.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert or refresh `key` as the most recently used entry.
    ///
    /// Returns the key evicted to stay within `max_entries`, if any.
    pub fn insert(
        &mut self,
        key: String,
        value: V,
        expires_at: Timestamp,
        generation: u64,
        now: Timestamp,
    ) -> Option<String> {
        let entry = CacheEntry {
            value,
            expires_at,
            generation,
            last_accessed: now,
        };

        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = entry;
            return None;
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.evict(now)
        } else {
            None
        };

        self.entries.put(key, entry);
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.pop(key)
    }

    /// Remove every key starting with `prefix`; returns the removed keys.
    pub fn remove_prefix(&mut self, prefix: &str) -> Vec<String> {
        self.remove_where(|key, _| key.starts_with(prefix))
    }

    /// Remove every entry that is no longer valid at `now`.
    pub fn purge_expired(&mut self, now: Timestamp) -> Vec<String> {
        self.remove_where(|_, entry| !entry.is_valid(now))
    }

    pub(crate) fn remove_where<F>(&mut self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let doomed: Vec<String> = self
            .lru_order()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            self.entries.pop(key);
        }
        doomed
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lru_order().map(|(key, _)| key.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop one entry to make room: the stalest expired one if any,
    /// otherwise the least recently used.
    fn evict(&mut self, now: Timestamp) -> Option<String> {
        let expired = self
            .lru_order()
            .find(|(_, entry)| !entry.is_valid(now))
            .map(|(key, _)| key.clone());

        match expired {
            Some(key) => self.entries.pop(&key).map(|_| key),
            None => self.entries.pop_lru().map(|(key, _)| key),
        }
    }

    fn lru_order(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> + '_ {
        self.entries.iter().rev()
    }
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
