//! Error types for cache operations.

use std::fmt;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by cache operations and producers.
///
/// `Error` is `Clone` because a single production outcome is broadcast to
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The producer (backend call, repository fetch) failed.
    ProducerError(String),

    /// The producer exceeded a caller-imposed deadline.
    Timeout(String),

    /// The production task panicked or was torn down before it settled.
    ProductionAborted(String),

    /// `CacheStrategy::Fresh` found no valid entry for the key.
    NotCached(String),

    /// A value could not be encoded for durable storage.
    SerializationError(String),

    /// A stored payload could not be decoded.
    DeserializationError(String),

    /// A stored payload has a bad magic header or a truncated envelope.
    InvalidCacheEntry(String),

    /// A stored payload was written with a different schema version.
    VersionMismatch { expected: u32, found: u32 },

    /// The durable store is unavailable or an I/O operation failed.
    BackendError(String),

    /// Invalid configuration.
    ConfigError(String),

    /// Invalid input such as an empty resource name.
    ValidationError(String),
}

impl Error {
    /// Whether the error came from the producer rather than from the cache.
    pub fn is_producer_failure(&self) -> bool {
        matches!(
            self,
            Error::ProducerError(_) | Error::Timeout(_) | Error::ProductionAborted(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ProducerError(msg) => write!(f, "producer error: {}", msg),
            Error::Timeout(msg) => write!(f, "timeout: {}", msg),
            Error::ProductionAborted(msg) => write!(f, "production aborted: {}", msg),
            Error::NotCached(key) => write!(f, "no valid cache entry for key: {}", key),
            Error::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "schema version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::BackendError(msg) => write!(f, "backend error: {}", msg),
            Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
            Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else {
            Error::DeserializationError(e.to_string())
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::ProducerError("503 from /products".to_string());
        assert_eq!(err.to_string(), "producer error: 503 from /products");

        let err = Error::VersionMismatch {
            expected: 1,
            found: 7,
        };
        assert_eq!(
            err.to_string(),
            "schema version mismatch: expected 1, found 7"
        );
    }

    #[test]
    fn test_producer_failure_classification() {
        assert!(Error::ProducerError("x".into()).is_producer_failure());
        assert!(Error::Timeout("x".into()).is_producer_failure());
        assert!(Error::ProductionAborted("x".into()).is_producer_failure());
        assert!(!Error::BackendError("x".into()).is_producer_failure());
        assert!(!Error::NotCached("k".into()).is_producer_failure());
    }

    #[tokio::test]
    async fn test_elapsed_converts_to_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .expect_err("pending future must time out");

        assert!(matches!(Error::from(elapsed), Error::Timeout(_)));
    }
}
