mod common;

use labelmatch::{CacheStats, CatalogId, MetadataCache};
use std::fmt::Write;
use std::sync::Arc;

fn catalog(rows: i64) -> Arc<labelmatch::CatalogTable> {
    let mut csv = String::from("id,name,region,image_url\n");
    for id in 1..=rows {
        let region = id % 3;
        writeln!(csv, "{id},Bottle {id},Region {region},http://img/{id}.jpg").unwrap();
    }
    Arc::new(common::table(&csv))
}

#[test]
fn capacity_plus_one_evicts_least_recent() {
    let cache = MetadataCache::new(catalog(10), 3);
    for id in 1..=3 {
        assert!(cache.get_details(&CatalogId::Numeric(id)).is_some());
    }
    // Touch 1 so that 2 becomes the eviction candidate.
    cache.get_details(&CatalogId::Numeric(1));
    cache.get_details(&CatalogId::Numeric(4));

    assert_eq!(cache.len(), 3);
    assert_eq!(
        cache.cached_ids(),
        vec![
            CatalogId::Numeric(3),
            CatalogId::Numeric(1),
            CatalogId::Numeric(4),
        ]
    );
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 1,
            misses: 4,
            evictions: 1
        }
    );
}

#[test]
fn repeated_gets_do_not_duplicate() {
    let cache = MetadataCache::new(catalog(5), 4);
    let first = cache.get_details(&CatalogId::Numeric(2)).unwrap();
    for _ in 0..50 {
        let again = cache.get_details(&CatalogId::Numeric(2)).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(first.name(), "Bottle 2");
    assert_eq!(first.get("region"), Some("Region 2"));
    assert!(first.get("image_url").is_none());
}

#[test]
fn dataset_misses_are_not_cached() {
    let cache = MetadataCache::new(catalog(2), 4);
    assert!(cache.get_details(&CatalogId::Numeric(77)).is_none());
    assert!(cache.get_details(&CatalogId::parse("nope")).is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn concurrent_lookups_keep_the_cache_consistent() {
    let cache = MetadataCache::new(catalog(20), 5);
    std::thread::scope(|scope| {
        for worker in 0..8i64 {
            let cache = &cache;
            scope.spawn(move || {
                for step in 0..300i64 {
                    let id = (worker * 7 + step) % 20 + 1;
                    let detail = cache.get_details(&CatalogId::Numeric(id)).unwrap();
                    assert_eq!(detail.id(), &CatalogId::Numeric(id));
                    assert_eq!(detail.name(), format!("Bottle {id}"));
                }
            });
        }
    });

    let ids = cache.cached_ids();
    assert_eq!(ids.len(), 5);
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 8 * 300);
    assert_eq!(stats.misses - stats.evictions, 5);
}
