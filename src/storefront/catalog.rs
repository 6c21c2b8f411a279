//! Product listings per brand.

use super::models::{BrandProductsQuery, Product};
use super::or_empty;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::manager::CoalescingCacheManager;
use crate::observability::{TtlPolicy, CATALOG_TTL};
use crate::repository::StorefrontRepository;
use crate::CacheEntity;
use std::sync::Arc;

/// Cached access to brand product pages.
///
/// Keys look like `catalog:brand:7?{"filters":{..},"order":"desc",..}`, so all
/// pages, orderings and filter combinations of one brand share the
/// `catalog:brand:7` family.
pub struct CatalogService<R> {
    repo: Arc<R>,
    cache: CoalescingCacheManager<Vec<Product>>,
}

impl<R> Clone for CatalogService<R> {
    fn clone(&self) -> Self {
        CatalogService {
            repo: Arc::clone(&self.repo),
            cache: self.cache.clone(),
        }
    }
}

impl<R: StorefrontRepository> CatalogService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self::with_cache(
            repo,
            CoalescingCacheManager::new().with_ttl_policy(TtlPolicy::storefront()),
        )
    }

    pub fn with_cache(repo: Arc<R>, cache: CoalescingCacheManager<Vec<Product>>) -> Self {
        CatalogService { repo, cache }
    }

    /// Family shared by every listing of `brand_id`.
    pub fn brand_family(brand_id: u64) -> String {
        Self::brand_key(brand_id).family()
    }

    pub fn products_key(query: &BrandProductsQuery) -> Result<String> {
        Ok(Self::brand_key(query.brand_id).params(query)?.build())
    }

    fn brand_key(brand_id: u64) -> CacheKeyBuilder {
        CacheKeyBuilder::new(Product::cache_prefix())
            .segment("brand")
            .segment(brand_id)
    }

    /// One page of a brand's products, cached for five minutes.
    ///
    /// # Errors
    /// Returns the repository's error; nothing is cached in that case.
    pub async fn try_products_by_brand(&self, query: &BrandProductsQuery) -> Result<Vec<Product>> {
        let key = Self::products_key(query)?;
        let repo = Arc::clone(&self.repo);
        let query = query.clone();

        self.cache
            .get(
                key,
                move || async move { repo.products_by_brand(&query).await },
                CATALOG_TTL,
            )
            .await
    }

    /// Like [`try_products_by_brand`](Self::try_products_by_brand), with an
    /// empty page on failure.
    pub async fn products_by_brand(&self, query: &BrandProductsQuery) -> Vec<Product> {
        or_empty("product", self.try_products_by_brand(query).await)
    }

    /// Drop every cached listing of `brand_id`. Returns how many were removed.
    pub fn invalidate_brand(&self, brand_id: u64) -> usize {
        let removed = self.cache.invalidate_family(&Self::brand_family(brand_id));
        info!("Invalidated {} product listings of brand {}", removed, brand_id);
        removed
    }

    pub fn cache(&self) -> &CoalescingCacheManager<Vec<Product>> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::storefront::models::SortOrder;
    use std::time::Duration;

    fn product(id: u64, brand_id: u64) -> Product {
        Product {
            id,
            name: format!("Product {}", id),
            slug: format!("product-{}", id),
            brand_id,
            price: "9.90".to_string(),
            in_stock: true,
        }
    }

    fn repository() -> Arc<InMemoryRepository> {
        Arc::new(InMemoryRepository::new().with_products(vec![
            product(1, 7),
            product(2, 7),
            product(3, 8),
        ]))
    }

    #[test]
    fn test_filter_order_does_not_change_key() {
        let a = BrandProductsQuery::new(7).filter("pa_size", ["m", "l"]);
        let b = BrandProductsQuery::new(7).filter("pa_size", ["l", "m"]);
        let c = BrandProductsQuery::new(7).filter("pa_size", ["l"]);

        let key_a = CatalogService::<InMemoryRepository>::products_key(&a).expect("key");
        let key_b = CatalogService::<InMemoryRepository>::products_key(&b).expect("key");
        let key_c = CatalogService::<InMemoryRepository>::products_key(&c).expect("key");

        assert_eq!(key_a, key_b);
        assert_ne!(key_a, key_c);
        assert!(key_a.starts_with("catalog:brand:7?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_page_hits_backend_once() {
        let repo = repository();
        let catalog = CatalogService::new(repo.clone());
        let query = BrandProductsQuery::new(7);

        let first = catalog.products_by_brand(&query).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = catalog.products_by_brand(&query).await;

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(repo.calls("products_by_brand"), 1);

        tokio::time::sleep(CATALOG_TTL).await;
        catalog.products_by_brand(&query).await;
        assert_eq!(repo.calls("products_by_brand"), 2);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_empty_and_is_not_cached() {
        let repo = repository();
        let catalog = CatalogService::new(repo.clone());
        let query = BrandProductsQuery::new(7);

        repo.fail_next(1);
        assert!(catalog.try_products_by_brand(&query).await.is_err());
        repo.fail_next(1);
        assert!(catalog.products_by_brand(&query).await.is_empty());

        assert_eq!(catalog.products_by_brand(&query).await.len(), 2);
        assert_eq!(repo.calls("products_by_brand"), 3);
    }

    #[tokio::test]
    async fn test_invalidate_brand_drops_every_variant() {
        let repo = repository();
        let catalog = CatalogService::new(repo.clone());

        for query in [
            BrandProductsQuery::new(7),
            BrandProductsQuery::new(7).page(2),
            BrandProductsQuery::new(7).order_by("price", SortOrder::Asc),
            BrandProductsQuery::new(8),
        ] {
            catalog.products_by_brand(&query).await;
        }
        assert_eq!(catalog.cache().len(), 4);

        assert_eq!(catalog.invalidate_brand(7), 3);
        assert_eq!(catalog.cache().len(), 1);

        catalog.products_by_brand(&BrandProductsQuery::new(8)).await;
        assert_eq!(repo.calls("products_by_brand"), 4);
    }
}
