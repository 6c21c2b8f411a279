use coalesce_kit::key::CacheKeyBuilder;
use coalesce_kit::{CoalescingCacheManager, Result};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

fn page(size: usize) -> Vec<String> {
    (0..size).map(|i| format!("product-{}", i)).collect()
}

fn bench_hit_path(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("manager/hit");

    for size in [1usize, 24, 100] {
        let cache: CoalescingCacheManager<Vec<String>> = CoalescingCacheManager::new();
        rt.block_on(async {
            cache
                .get("catalog:brand:7", move || async move { Ok(page(size)) }, TTL)
                .await
                .expect("warm cache");
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let value = cache
                    .get(
                        "catalog:brand:7",
                        || async { Ok::<_, coalesce_kit::Error>(Vec::new()) },
                        TTL,
                    )
                    .await;
                black_box(value)
            });
        });
    }
    group.finish();
}

fn bench_miss_path(c: &mut Criterion) {
    let rt = runtime();
    let cache: CoalescingCacheManager<Vec<String>> = CoalescingCacheManager::new();

    c.bench_function("manager/miss_zero_ttl", |b| {
        b.to_async(&rt).iter(|| async {
            let value: Result<Vec<String>> = cache
                .get("blog", || async { Ok(page(10)) }, Duration::ZERO)
                .await;
            black_box(value)
        });
    });
}

fn bench_key_building(c: &mut Criterion) {
    c.bench_function("key/brand_products", |b| {
        b.iter(|| {
            let key = CacheKeyBuilder::new("catalog")
                .segment("brand")
                .segment(black_box(7))
                .param("page", 1)
                .param("per_page", 24)
                .param("orderby", "price")
                .param("filters", serde_json::json!({ "pa_color": ["red", "blue"] }))
                .build();
            black_box(key)
        });
    });
}

criterion_group!(benches, bench_hit_path, bench_miss_path, bench_key_building);
criterion_main!(benches);
