//! Cache manager configuration.

use crate::error::{Error, Result};
use crate::observability::TtlPolicy;
use crate::store::DEFAULT_MAX_ENTRIES;
use std::time::Duration;

/// Environment variable overriding [`CacheConfig::max_entries`].
pub const ENV_MAX_ENTRIES: &str = "COALESCE_MAX_ENTRIES";

/// Environment variable setting a fixed default TTL in milliseconds.
pub const ENV_DEFAULT_TTL_MS: &str = "COALESCE_DEFAULT_TTL_MS";

/// Configuration for a [`crate::CoalescingCacheManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound on stored entries; LRU eviction beyond it.
    pub max_entries: usize,
    /// TTL applied when a call does not pass one explicitly.
    pub ttl_policy: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_policy: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Build from the environment.
    ///
    /// 1. `COALESCE_MAX_ENTRIES` (if set and parsable)
    /// 2. `COALESCE_DEFAULT_TTL_MS` (if set and parsable), as a fixed policy
    /// 3. Defaults otherwise
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::default();

        if let Some(raw) = lookup(ENV_MAX_ENTRIES) {
            match raw.trim().parse::<usize>() {
                Ok(max) => config.max_entries = max,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_MAX_ENTRIES, raw, e),
            }
        }

        if let Some(raw) = lookup(ENV_DEFAULT_TTL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.ttl_policy = TtlPolicy::Fixed(Duration::from_millis(ms)),
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_DEFAULT_TTL_MS, raw, e),
            }
        }

        config
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// # Errors
    /// Returns `Error::ConfigError` if `max_entries` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::ConfigError(
                "max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
