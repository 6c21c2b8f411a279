//! Trait for values that can be persisted beyond the in-memory cache.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Trait that all values written to a durable store must implement.
///
/// The in-memory [`crate::CoalescingCacheManager`] only needs `Clone`;
/// `CacheEntity` is required once a value flows through
/// [`crate::persisted::PersistedCacheAdapter`].
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use coalesce_kit::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct BlogPost {
///     pub id: u64,
///     pub title: String,
/// }
///
/// impl CacheEntity for BlogPost {
///     fn cache_prefix() -> &'static str {
///         "blog"
///     }
/// }
/// ```
pub trait CacheEntity:
    Send + Sync + Serialize + for<'de> Deserialize<'de> + Clone + 'static
{
    /// Resource name used to namespace keys and pick a TTL.
    ///
    /// Example: "brand", "blog"
    fn cache_prefix() -> &'static str;

    /// Serialize the value for durable storage.
    ///
    /// Uses the versioned postcard envelope from `crate::serialization`:
    ///
    /// ```text
    /// [MAGIC: 4 bytes] [VERSION: 4 bytes] [POSTCARD PAYLOAD]
    /// ```
    fn serialize_for_cache(&self) -> Result<Vec<u8>> {
        crate::serialization::serialize_for_cache(self)
    }

    /// Deserialize a value written by [`CacheEntity::serialize_for_cache`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCacheEntry`: Bad magic or truncated envelope
    /// - `Error::VersionMismatch`: Schema version changed
    /// - `Error::DeserializationError`: Corrupted payload
    fn deserialize_from_cache(bytes: &[u8]) -> Result<Self> {
        crate::serialization::deserialize_from_cache(bytes)
    }

    /// Optional: check a value after it was loaded from durable storage.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

// Listings are the common case: a page of products, a page of posts.
impl<T: CacheEntity> CacheEntity for Vec<T> {
    fn cache_prefix() -> &'static str {
        T::cache_prefix()
    }

    fn validate(&self) -> Result<()> {
        self.iter().try_for_each(CacheEntity::validate)
    }
}

impl<T: CacheEntity> CacheEntity for Option<T> {
    fn cache_prefix() -> &'static str {
        T::cache_prefix()
    }

    fn validate(&self) -> Result<()> {
        self.as_ref().map_or(Ok(()), CacheEntity::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: u64,
        title: String,
    }

    impl CacheEntity for Post {
        fn cache_prefix() -> &'static str {
            "blog"
        }

        fn validate(&self) -> Result<()> {
            if self.title.is_empty() {
                return Err(Error::ValidationError(format!("post {} has no title", self.id)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_serialize_deserialize() {
        let post = Post {
            id: 1,
            title: "Spring lookbook".to_string(),
        };

        let bytes = post.serialize_for_cache().unwrap();
        let restored = Post::deserialize_from_cache(&bytes).unwrap();

        assert_eq!(post, restored);
    }

    #[test]
    fn test_vec_inherits_prefix_and_validation() {
        assert_eq!(Vec::<Post>::cache_prefix(), "blog");

        let posts = vec![
            Post {
                id: 1,
                title: "ok".to_string(),
            },
            Post {
                id: 2,
                title: String::new(),
            },
        ];
        assert!(matches!(posts.validate(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_option_cache_entity() {
        let none: Option<Post> = None;
        assert_eq!(Option::<Post>::cache_prefix(), "blog");
        assert!(none.validate().is_ok());

        let bytes = none.serialize_for_cache().unwrap();
        assert_eq!(Option::<Post>::deserialize_from_cache(&bytes).unwrap(), None);
    }
}
