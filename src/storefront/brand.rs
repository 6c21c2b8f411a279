//! Brand listings and attribute terms (the filter sidebar).

use super::models::{AttributeTerm, Brand};
use super::or_empty;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::manager::CoalescingCacheManager;
use crate::observability::CATALOG_TTL;
use crate::repository::StorefrontRepository;
use crate::CacheEntity;
use std::sync::Arc;

pub struct BrandService<R> {
    repo: Arc<R>,
    brands: CoalescingCacheManager<Vec<Brand>>,
    terms: CoalescingCacheManager<Vec<AttributeTerm>>,
}

impl<R> Clone for BrandService<R> {
    fn clone(&self) -> Self {
        BrandService {
            repo: Arc::clone(&self.repo),
            brands: self.brands.clone(),
            terms: self.terms.clone(),
        }
    }
}

impl<R: StorefrontRepository> BrandService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        BrandService {
            repo,
            brands: CoalescingCacheManager::new(),
            terms: CoalescingCacheManager::new(),
        }
    }

    /// `brand?{"page":1,"per_page":100}`
    pub fn brands_key(page: u32, per_page: u32) -> String {
        CacheKeyBuilder::for_entity::<Brand>()
            .param("page", page)
            .param("per_page", per_page)
            .build()
    }

    /// `attribute:3`
    pub fn terms_key(attribute_id: u64) -> String {
        CacheKeyBuilder::for_entity::<AttributeTerm>()
            .segment(attribute_id)
            .build()
    }

    /// # Errors
    /// Returns the repository's error; nothing is cached in that case.
    pub async fn try_brands(&self, page: u32, per_page: u32) -> Result<Vec<Brand>> {
        let repo = Arc::clone(&self.repo);
        self.brands
            .get(
                Self::brands_key(page, per_page),
                move || async move { repo.brands(page, per_page).await },
                CATALOG_TTL,
            )
            .await
    }

    /// One page of brands, cached for five minutes; empty on failure.
    pub async fn brands(&self, page: u32, per_page: u32) -> Vec<Brand> {
        or_empty("brand", self.try_brands(page, per_page).await)
    }

    /// # Errors
    /// Returns the repository's error; nothing is cached in that case.
    pub async fn try_attribute_terms(&self, attribute_id: u64) -> Result<Vec<AttributeTerm>> {
        let repo = Arc::clone(&self.repo);
        self.terms
            .get(
                Self::terms_key(attribute_id),
                move || async move { repo.attribute_terms(attribute_id).await },
                CATALOG_TTL,
            )
            .await
    }

    /// Terms of one attribute, cached for five minutes; empty on failure.
    pub async fn attribute_terms(&self, attribute_id: u64) -> Vec<AttributeTerm> {
        or_empty("attribute term", self.try_attribute_terms(attribute_id).await)
    }

    /// Drop every cached brand page.
    pub fn invalidate_brands(&self) -> usize {
        self.brands.invalidate_family(Brand::cache_prefix())
    }

    pub fn invalidate_attribute(&self, attribute_id: u64) -> bool {
        self.terms.invalidate(&Self::terms_key(attribute_id))
    }
}
