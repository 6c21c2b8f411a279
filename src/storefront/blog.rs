//! Blog listings, persisted so a restart serves the last known pages.

use super::models::{BlogPost, BlogQuery};
use super::or_empty;
use crate::backend::DurableStore;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::manager::CoalescingCacheManager;
use crate::observability::BLOG_TTL;
use crate::persisted::PersistedCacheAdapter;
use crate::repository::StorefrontRepository;
use crate::CacheEntity;
use std::sync::Arc;

pub struct BlogService<R, S> {
    repo: Arc<R>,
    cache: PersistedCacheAdapter<Vec<BlogPost>, S>,
}

impl<R, S> Clone for BlogService<R, S> {
    fn clone(&self) -> Self {
        BlogService {
            repo: Arc::clone(&self.repo),
            cache: self.cache.clone(),
        }
    }
}

impl<R, S> BlogService<R, S>
where
    R: StorefrontRepository,
    S: DurableStore,
{
    /// Restore persisted pages from `store` and start caching.
    pub async fn open(repo: Arc<R>, store: S) -> Self {
        Self::with_cache(repo, CoalescingCacheManager::new(), store).await
    }

    pub async fn with_cache(
        repo: Arc<R>,
        cache: CoalescingCacheManager<Vec<BlogPost>>,
        store: S,
    ) -> Self {
        BlogService {
            repo,
            cache: PersistedCacheAdapter::open(cache, store).await,
        }
    }

    /// `blog?{"page":1,"per_page":10}`
    pub fn posts_key(query: &BlogQuery) -> String {
        CacheKeyBuilder::for_entity::<BlogPost>()
            .param("page", query.page)
            .param("per_page", query.per_page)
            .build()
    }

    /// # Errors
    /// Returns the repository's error; nothing is cached in that case.
    pub async fn try_posts(&self, query: &BlogQuery) -> Result<Vec<BlogPost>> {
        let repo = Arc::clone(&self.repo);
        let query = *query;
        self.cache
            .get(
                Self::posts_key(&query),
                move || async move { repo.blog_posts(&query).await },
                BLOG_TTL,
            )
            .await
    }

    /// One page of posts, cached for an hour; empty on failure.
    pub async fn posts(&self, query: &BlogQuery) -> Vec<BlogPost> {
        or_empty("blog post", self.try_posts(query).await)
    }

    /// Drop every cached page, in memory and on disk.
    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_family(BlogPost::cache_prefix())
    }

    /// Wait for pending durable writes.
    pub async fn flush(&self) {
        self.cache.flush().await
    }

    pub fn cache(&self) -> &PersistedCacheAdapter<Vec<BlogPost>, S> {
        &self.cache
    }
}
