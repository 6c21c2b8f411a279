//! Metrics hooks and TTL policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// TTL observed for catalog and brand listings.
pub const CATALOG_TTL: Duration = Duration::from_millis(300_000);

/// TTL observed for blog listings.
pub const BLOG_TTL: Duration = Duration::from_millis(3_600_000);

/// Hooks invoked by the cache manager. Every method defaults to a no-op.
pub trait CacheMetrics: Send + Sync {
    /// A valid entry was served without invoking the producer.
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    /// The caller waited on a production (started or joined).
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    /// The caller joined a production already in flight.
    fn record_coalesced(&self, _key: &str) {}

    /// An entry was dropped to stay within capacity.
    fn record_eviction(&self, _key: &str) {}

    /// A superseded production completed and its result was not stored.
    fn record_stale_discard(&self, _key: &str) {}

    /// The caller received a producer failure.
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics sink that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub stale_discards: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters for every hook.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    stale_discards: AtomicU64,
    errors: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CounterMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_coalesced(&self, _key: &str) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self, _key: &str) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stale_discard(&self, _key: &str) {
        self.stale_discards.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, _key: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// How long a production stays valid when the caller gives no explicit TTL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TtlPolicy {
    /// Five minutes for everything.
    #[default]
    Default,

    /// The same TTL for every key.
    Fixed(Duration),

    /// Per-resource TTLs; the longest matching key prefix wins.
    PerResource {
        rules: Vec<(String, Duration)>,
        fallback: Duration,
    },
}

impl TtlPolicy {
    /// TTLs used by the storefront services.
    pub fn storefront() -> Self {
        TtlPolicy::PerResource {
            rules: vec![
                ("catalog".to_string(), CATALOG_TTL),
                ("brand".to_string(), CATALOG_TTL),
                ("attribute".to_string(), CATALOG_TTL),
                ("blog".to_string(), BLOG_TTL),
            ],
            fallback: CATALOG_TTL,
        }
    }

    pub fn get_ttl(&self, key: &str) -> Duration {
        match self {
            TtlPolicy::Default => CATALOG_TTL,
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::PerResource { rules, fallback } => rules
                .iter()
                .filter(|(prefix, _)| crate::key::is_in_family(key, prefix))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, ttl)| *ttl)
                .unwrap_or(*fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_policy_is_five_minutes() {
        assert_eq!(
            TtlPolicy::default().get_ttl("anything"),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_fixed_policy() {
        let policy = TtlPolicy::Fixed(Duration::from_secs(42));
        assert_eq!(policy.get_ttl("blog"), Duration::from_secs(42));
    }

    #[test]
    fn test_storefront_policy_by_resource() {
        let policy = TtlPolicy::storefront();
        assert_eq!(policy.get_ttl(r#"blog?{"page":1}"#), BLOG_TTL);
        assert_eq!(policy.get_ttl(r#"brand:7?{"page":1}"#), CATALOG_TTL);
        // "blogger" is not the blog resource
        assert_eq!(policy.get_ttl("blogger"), CATALOG_TTL);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let policy = TtlPolicy::PerResource {
            rules: vec![
                ("brand".to_string(), Duration::from_secs(60)),
                ("brand:7".to_string(), Duration::from_secs(5)),
            ],
            fallback: Duration::from_secs(1),
        };
        assert_eq!(policy.get_ttl("brand:7?x"), Duration::from_secs(5));
        assert_eq!(policy.get_ttl("brand:8"), Duration::from_secs(60));
        assert_eq!(policy.get_ttl("other"), Duration::from_secs(1));
    }

    #[test]
    fn test_counter_metrics_behind_trait_object() {
        let metrics = Arc::new(CounterMetrics::new());
        let shared: Arc<dyn CacheMetrics> = metrics.clone();

        shared.record_hit("k", Duration::ZERO);
        shared.record_hit("k", Duration::ZERO);
        shared.record_miss("k", Duration::ZERO);
        shared.record_coalesced("k");
        shared.record_error("k", "boom");

        let stats = metrics.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.errors, 1);
        assert!((stats.hit_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }
}
