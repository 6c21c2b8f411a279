//! Storefront data services.
//!
//! Each service builds its keys with [`crate::key::CacheKeyBuilder`], hands
//! the cache a producer that calls the [`crate::repository::StorefrontRepository`]
//! and degrades to an empty listing when the backend fails.

pub mod blog;
pub mod brand;
pub mod catalog;
pub mod models;

pub use blog::BlogService;
pub use brand::BrandService;
pub use catalog::CatalogService;
pub use models::{AttributeTerm, BlogPost, BlogQuery, Brand, BrandProductsQuery, Product, SortOrder};

use crate::error::Result;

/// Serve an empty listing instead of an error. The failure is logged.
pub(crate) fn or_empty<T>(what: &str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!("✗ Serving empty {} listing: {}", what, e);
        Vec::new()
    })
}
