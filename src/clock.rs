//! Time sources for expiry and LRU bookkeeping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
///
/// Wall-clock aligned so that expiry instants survive a process restart when
/// persisted by [`crate::persisted::PersistedCacheAdapter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Saturating addition of a TTL, rounded up to whole milliseconds so a
    /// non-zero TTL never yields an already expired timestamp.
    pub fn saturating_add(self, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(ttl_ms))
    }

    /// Time left until `later`, zero if it already passed.
    pub fn until(self, later: Timestamp) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Supplies "now". Must never go backwards.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Production clock.
///
/// Anchors the wall clock once at construction and advances with tokio's
/// monotonic clock afterwards, so it never jumps backwards and honours
/// `tokio::time::pause`/`advance` in tests.
#[derive(Debug, Clone)]
pub struct SystemClock {
    wall_origin: u64,
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let wall_origin = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        SystemClock {
            wall_origin,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.wall_origin).saturating_add(self.origin.elapsed())
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            millis: AtomicU64::new(start.as_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward to `to`; earlier instants are ignored.
    pub fn set(&self, to: Timestamp) {
        self.millis.fetch_max(to.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}
