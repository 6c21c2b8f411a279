//! # coalesce-kit
//!
//! An async response cache for slow, rate-limited backends.
//!
//! ## Features
//!
//! - **Request Coalescing:** Concurrent callers for the same key share one production
//! - **TTL Expiry:** Results are served until they expire, then produced again
//! - **No Negative Caching:** Failures reach every waiter and are never stored
//! - **Safe Invalidation:** A production started before `invalidate` can never overwrite newer data
//! - **Bounded:** LRU eviction beyond a configurable number of entries
//! - **Warm Restarts:** Optional write-through to a durable store (in-memory, JSON file, or custom)
//! - **Production Ready:** Built-in logging, metrics hooks, and error handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use coalesce_kit::{key::CacheKeyBuilder, CoalescingCacheManager, Result};
//! use std::time::Duration;
//!
//! // 1. One manager per value type, shared by cloning
//! let cache: CoalescingCacheManager<Vec<Product>> = CoalescingCacheManager::new();
//!
//! // 2. Derive a canonical key from the query
//! let key = CacheKeyBuilder::new("catalog")
//!     .segment("brand")
//!     .segment(7)
//!     .params(&query)?
//!     .build();
//!
//! // 3. Fetch through the cache; the producer runs only on a miss
//! let repo = repo.clone();
//! let products = cache
//!     .get(key, move || async move { repo.products_by_brand(&query).await }, Duration::from_secs(300))
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod manager;
pub mod observability;
pub mod persisted;
pub mod repository;
pub mod serialization;
pub mod store;
pub mod storefront;
pub mod strategy;

// Re-exports for convenience
pub use backend::{DurableStore, StoredRecord};
pub use builder::FetchBuilder;
pub use clock::{Clock, SystemClock, Timestamp};
pub use config::CacheConfig;
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use manager::{CoalescingCacheManager, EntryListener, Invalidation};
pub use observability::{CacheMetrics, TtlPolicy};
pub use persisted::PersistedCacheAdapter;
pub use repository::StorefrontRepository;
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
