//! Storefront walkthrough: coalescing, fallbacks, invalidation and a warm
//! restart from a snapshot file.
//!
//! Run with `RUST_LOG=debug cargo run --example storefront` to see every hit,
//! join and launch.

use coalesce_kit::backend::FileStore;
use coalesce_kit::error::Result;
use coalesce_kit::observability::CounterMetrics;
use coalesce_kit::repository::InMemoryRepository;
use coalesce_kit::storefront::{
    BlogPost, BlogQuery, BlogService, Brand, BrandProductsQuery, BrandService, CatalogService,
    Product, SortOrder,
};
use coalesce_kit::{CacheConfig, CoalescingCacheManager, TtlPolicy};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn fixture() -> InMemoryRepository {
    let products = (1..=30)
        .map(|id| Product {
            id,
            name: format!("Product {}", id),
            slug: format!("product-{}", id),
            brand_id: if id % 2 == 0 { 7 } else { 8 },
            price: format!("{}.90", 10 + id),
            in_stock: id % 5 != 0,
        })
        .collect();
    let brands = vec![
        Brand {
            id: 7,
            name: "Northwind".to_string(),
            slug: "northwind".to_string(),
            count: 15,
        },
        Brand {
            id: 8,
            name: "Contoso".to_string(),
            slug: "contoso".to_string(),
            count: 15,
        },
    ];
    let posts = (1..=12)
        .map(|id| BlogPost {
            id,
            title: format!("Journal entry {}", id),
            slug: format!("journal-{}", id),
            excerpt: "Notes from the workshop".to_string(),
            published_at: format!("2024-05-{:02}T09:00:00Z", id),
        })
        .collect();

    InMemoryRepository::new()
        .with_products(products)
        .with_brands(brands)
        .with_posts(posts)
        .with_latency(Duration::from_millis(300))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== coalesce-kit - Storefront Example ===\n");

    let repo = Arc::new(fixture());
    let metrics = Arc::new(CounterMetrics::new());
    let config = CacheConfig::from_env().with_ttl_policy(TtlPolicy::storefront());
    let catalog = CatalogService::with_cache(
        repo.clone(),
        CoalescingCacheManager::with_config(config)?.with_metrics(metrics.clone()),
    );
    let brands = BrandService::new(repo.clone());

    // 1. Ten simultaneous requests for the same page
    println!("1. Ten concurrent requests for brand 7, page 1:");
    let query = BrandProductsQuery::new(7).per_page(5);
    let pages = join_all((0..10).map(|_| catalog.products_by_brand(&query))).await;
    println!(
        "   ✓ {} responses of {} products, backend calls: {}\n",
        pages.len(),
        pages[0].len(),
        repo.calls("products_by_brand")
    );

    // 2. Same filters in a different order hit the same entry
    println!("2. Equivalent filter sets share one entry:");
    let a = BrandProductsQuery::new(7).filter("pa_color", ["red", "blue"]);
    let b = BrandProductsQuery::new(7).filter("pa_color", ["blue", "red"]);
    catalog.products_by_brand(&a).await;
    catalog.products_by_brand(&b).await;
    println!("   key: {}", CatalogService::<InMemoryRepository>::products_key(&a)?);
    println!(
        "   ✓ backend calls so far: {}\n",
        repo.calls("products_by_brand")
    );

    // 3. Backend outage degrades to an empty list and is not cached
    println!("3. Backend outage:");
    repo.fail_next(1);
    let brand_page = brands.brands(1, 10).await;
    println!("   ✓ during outage: {} brands", brand_page.len());
    let brand_page = brands.brands(1, 10).await;
    println!("   ✓ after recovery: {} brands\n", brand_page.len());

    // 4. Invalidate a brand after a price change
    println!("4. Price change for brand 7:");
    catalog.products_by_brand(&query.clone().order_by("price", SortOrder::Asc)).await;
    let removed = catalog.invalidate_brand(7);
    println!("   ✓ dropped {} cached listings\n", removed);

    // 5. Blog listings survive a restart
    println!("5. Persisted blog listings:");
    let snapshot = std::env::temp_dir().join("coalesce-kit-demo-blog.json");
    let blog = BlogService::open(repo.clone(), FileStore::at(&snapshot)).await;
    let posts = blog.posts(&BlogQuery::default()).await;
    blog.flush().await;
    println!("   ✓ {} posts, snapshot at {}", posts.len(), snapshot.display());

    let restarted = BlogService::open(repo.clone(), FileStore::at(&snapshot)).await;
    let report = restarted.cache().restored();
    println!(
        "   ✓ restart restored {} pages ({} expired, {} skipped)\n",
        report.restored, report.expired, report.skipped
    );

    let stats = metrics.snapshot();
    println!(
        "Catalog stats: {} hits, {} misses, {} coalesced, hit ratio {:.2}",
        stats.hits,
        stats.misses,
        stats.coalesced,
        stats.hit_ratio()
    );
    println!("Total backend calls: {}", repo.total_calls());

    Ok(())
}
