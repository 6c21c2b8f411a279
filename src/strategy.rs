//! Cache strategies for a single fetch.

use std::fmt;

/// How a [`crate::builder::FetchBuilder`] treats the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheStrategy {
    /// Cache only: return a valid entry or `Error::NotCached`, never produce.
    Fresh,

    /// Serve a valid entry, otherwise produce (coalesced) and store.
    #[default]
    Refresh,

    /// Drop the entry and any production in flight, then produce and store.
    Invalidate,

    /// Call the producer directly. The cache is neither read nor written.
    Bypass,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Fresh => write!(f, "Fresh"),
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::Invalidate => write!(f, "Invalidate"),
            CacheStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_refresh() {
        assert_eq!(CacheStrategy::default(), CacheStrategy::Refresh);
    }

    #[test]
    fn test_display() {
        assert_eq!(CacheStrategy::Fresh.to_string(), "Fresh");
        assert_eq!(CacheStrategy::Bypass.to_string(), "Bypass");
    }
}
