//! Builder pattern for single cache fetches.

use crate::error::{Error, Result};
use crate::manager::CoalescingCacheManager;
use crate::strategy::CacheStrategy;
use std::future::Future;
use std::time::Duration;

/// Fluent builder for one fetch with a strategy and a TTL override.
///
/// # Example
///
/// ```ignore
/// use coalesce_kit::strategy::CacheStrategy;
/// use std::time::Duration;
///
/// let posts = cache
///     .fetch("blog?{\"page\":1}")
///     .with_strategy(CacheStrategy::Invalidate)
///     .with_ttl(Duration::from_secs(3600))
///     .execute(|| repo.blog_posts(query))
///     .await?;
/// ```
pub struct FetchBuilder<'a, V> {
    cache: &'a CoalescingCacheManager<V>,
    key: String,
    strategy: CacheStrategy,
    ttl_override: Option<Duration>,
}

impl<'a, V> FetchBuilder<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new builder with default settings.
    pub(crate) fn new(cache: &'a CoalescingCacheManager<V>, key: String) -> Self {
        Self {
            cache,
            key,
            strategy: CacheStrategy::Refresh,
            ttl_override: None,
        }
    }

    /// Set the cache strategy.
    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the TTL for this fetch.
    ///
    /// Without an override the manager's `TtlPolicy` decides from the key.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// TTL the fetch will store with.
    pub fn ttl(&self) -> Duration {
        self.ttl_override
            .unwrap_or_else(|| self.cache.ttl_policy().get_ttl(&self.key))
    }

    /// Execute the fetch.
    ///
    /// # Errors
    ///
    /// - `Error::NotCached`: `Fresh` strategy and no valid entry
    /// - any error returned by `producer`, unchanged
    pub async fn execute<F, Fut>(self, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let ttl = self.ttl();
        debug!("» Fetch {} (strategy: {}, ttl: {:?})", self.key, self.strategy, ttl);

        match self.strategy {
            CacheStrategy::Fresh => self
                .cache
                .get_cached(&self.key)
                .ok_or(Error::NotCached(self.key)),
            CacheStrategy::Refresh => self.cache.get(self.key, producer, ttl).await,
            CacheStrategy::Invalidate => {
                self.cache.invalidate(&self.key);
                self.cache.get(self.key, producer, ttl).await
            }
            CacheStrategy::Bypass => {
                debug!("Bypassing cache entirely for {}", self.key);
                producer().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock, Timestamp};
    use crate::config::CacheConfig;
    use crate::observability::TtlPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cache_with_clock() -> (CoalescingCacheManager<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(5_000)));
        let cache = CoalescingCacheManager::with_config(CacheConfig::default())
            .expect("valid config")
            .with_clock(clock.clone());
        (cache, clock)
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> std::future::Ready<Result<String>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value.to_string()))
        }
    }

    #[tokio::test]
    async fn test_builder_refresh_is_default() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.fetch("k").execute(counted(&calls, "v1")).await;
        let second = cache.fetch("k").execute(counted(&calls, "v2")).await;

        assert_eq!(first, Ok("v1".to_string()));
        assert_eq!(second, Ok("v1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_with_ttl_override() {
        let (cache, clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .fetch("k")
            .with_ttl(Duration::from_secs(10))
            .execute(counted(&calls, "v"))
            .await
            .expect("fetch");

        let entry = cache.peek("k").expect("stored");
        assert_eq!(clock.now().until(entry.expires_at), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_builder_uses_policy_without_override() {
        let (cache, _clock) = cache_with_clock();
        let cache = cache.with_ttl_policy(TtlPolicy::Fixed(Duration::from_secs(42)));

        assert_eq!(cache.fetch("anything").ttl(), Duration::from_secs(42));
        assert_eq!(
            cache
                .fetch("anything")
                .with_ttl(Duration::from_secs(1))
                .ttl(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_builder_fresh_strategy() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let miss = cache
            .fetch("k")
            .with_strategy(CacheStrategy::Fresh)
            .execute(counted(&calls, "v"))
            .await;
        assert_eq!(miss, Err(Error::NotCached("k".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cache.fetch("k").execute(counted(&calls, "v")).await.expect("fetch");
        let hit = cache
            .fetch("k")
            .with_strategy(CacheStrategy::Fresh)
            .execute(counted(&calls, "other"))
            .await;
        assert_eq!(hit, Ok("v".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_with_invalidate_strategy() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.fetch("k").execute(counted(&calls, "stale")).await.expect("fetch");
        let fresh = cache
            .fetch("k")
            .with_strategy(CacheStrategy::Invalidate)
            .execute(counted(&calls, "fresh"))
            .await;

        assert_eq!(fresh, Ok("fresh".to_string()));
        assert_eq!(cache.peek("k").map(|e| e.value), Some("fresh".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_builder_with_bypass_strategy() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.fetch("k").execute(counted(&calls, "cached")).await.expect("fetch");
        let direct = cache
            .fetch("k")
            .with_strategy(CacheStrategy::Bypass)
            .execute(counted(&calls, "direct"))
            .await;

        // Should get producer data, and the cache keeps the old entry
        assert_eq!(direct, Ok("direct".to_string()));
        assert_eq!(cache.peek("k").map(|e| e.value), Some("cached".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
