//! Data source abstraction for the storefront services.
//!
//! The cache never talks to the backend itself: services hand it a producer
//! that calls one of these methods.

use crate::error::{Error, Result};
use crate::storefront::models::{AttributeTerm, BlogPost, Brand, BrandProductsQuery, BlogQuery, Product};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for the slow, rate-limited storefront backend (a REST API, a
/// database, a search index).
pub trait StorefrontRepository: Send + Sync + 'static {
    fn products_by_brand(
        &self,
        query: &BrandProductsQuery,
    ) -> impl Future<Output = Result<Vec<Product>>> + Send;

    fn brands(&self, page: u32, per_page: u32) -> impl Future<Output = Result<Vec<Brand>>> + Send;

    fn attribute_terms(
        &self,
        attribute_id: u64,
    ) -> impl Future<Output = Result<Vec<AttributeTerm>>> + Send;

    fn blog_posts(&self, query: &BlogQuery) -> impl Future<Output = Result<Vec<BlogPost>>> + Send;
}

/// Repository over fixed data, with call counting, simulated latency and
/// failure injection.
///
/// Useful for tests and demos where the cache's effect on backend traffic
/// must be observable.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    products: Vec<Product>,
    brands: Vec<Brand>,
    terms: Vec<AttributeTerm>,
    posts: Vec<BlogPost>,
    latency: Duration,
    calls: Mutex<HashMap<&'static str, usize>>,
    total_calls: AtomicUsize,
    failures: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = products;
        self
    }

    pub fn with_brands(mut self, brands: Vec<Brand>) -> Self {
        self.brands = brands;
        self
    }

    pub fn with_terms(mut self, terms: Vec<AttributeTerm>) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_posts(mut self, posts: Vec<BlogPost>) -> Self {
        self.posts = posts;
        self
    }

    /// Delay every call by `latency` (uses Tokio time, so paused tests skip it).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` calls fail with a backend error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Calls made to one method, by name.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &'static str) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(method).or_insert(0) += 1;
        }
        debug!("[backend] {}", method);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::ProducerError(format!("{}: backend unavailable", method)));
        }
        Ok(())
    }
}

fn paginate<T: Clone>(items: impl Iterator<Item = T>, page: u32, per_page: u32) -> Vec<T> {
    let skip = page.saturating_sub(1) as usize * per_page as usize;
    items.skip(skip).take(per_page as usize).collect()
}

impl StorefrontRepository for InMemoryRepository {
    async fn products_by_brand(&self, query: &BrandProductsQuery) -> Result<Vec<Product>> {
        self.call("products_by_brand").await?;
        let matching = self
            .products
            .iter()
            .filter(|p| p.brand_id == query.brand_id)
            .cloned();
        Ok(paginate(matching, query.page, query.per_page))
    }

    async fn brands(&self, page: u32, per_page: u32) -> Result<Vec<Brand>> {
        self.call("brands").await?;
        Ok(paginate(self.brands.iter().cloned(), page, per_page))
    }

    async fn attribute_terms(&self, attribute_id: u64) -> Result<Vec<AttributeTerm>> {
        self.call("attribute_terms").await?;
        Ok(self
            .terms
            .iter()
            .filter(|t| t.attribute_id == attribute_id)
            .cloned()
            .collect())
    }

    async fn blog_posts(&self, query: &BlogQuery) -> Result<Vec<BlogPost>> {
        self.call("blog_posts").await?;
        Ok(paginate(self.posts.iter().cloned(), query.page, query.per_page))
    }
}
