//! Read-through behaviour of the single-item operations and the
//! write-through passthroughs.

mod common;

use common::{task, ScriptedApi, Task};
use locus_cache::{CacheConfig, CacheError, ItemCache, ItemKey, PriKey};
use serde_json::json;
use std::sync::Arc;
use serial_test::serial;

fn cache_over(api: ScriptedApi, config: CacheConfig) -> ItemCache<Task, ScriptedApi> {
    ItemCache::new(api, vec!["task".into()], config).unwrap()
}

fn key(pk: u32) -> ItemKey {
    ItemKey::Pri(PriKey::new("task", pk))
}

#[tokio::test]
async fn test_get_fetches_once_then_serves_from_cache() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));

    let first = cache.get(&key(1)).await.unwrap();
    let second = cache.get(&key(1)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(cache.remote().get_calls(), 1);
    assert_eq!(cache.stats().hits(), 1);
    assert_eq!(cache.stats().misses(), 1);
}

#[tokio::test]
async fn test_get_not_found_propagates_and_is_not_cached() {
    let api = ScriptedApi::new();
    let cache = cache_over(api, CacheConfig::new("lru"));

    let err = cache.get(&key(9)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(cache.cache_map().is_empty());

    // errors are not cached: the remote is consulted again
    let err = cache.get(&key(9)).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(cache.remote().get_calls(), 2);
}

#[tokio::test]
async fn test_retrieve_never_fetches() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));

    assert!(cache.retrieve(&key(1)).await.unwrap().is_none());
    assert_eq!(cache.remote().get_calls(), 0);

    cache.get(&key(1)).await.unwrap();
    assert!(cache.retrieve(&key(1)).await.unwrap().is_some());
    assert_eq!(cache.remote().get_calls(), 1);
}

#[tokio::test]
async fn test_bypass_skips_reads_and_writes() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru").with_bypass_cache(true));

    cache.get(&key(1)).await.unwrap();
    cache.get(&key(1)).await.unwrap();

    assert_eq!(cache.remote().get_calls(), 2, "every read goes remote");
    assert!(cache.cache_map().is_empty(), "nothing is written");

    // retrieve under bypass maps NotFound to None
    assert!(cache.retrieve(&key(404)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_ttl_expiry_falls_through_to_remote() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru").with_ttl_ms(30));

    cache.get(&key(1)).await.unwrap();
    assert_eq!(cache.remote().get_calls(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    cache.get(&key(1)).await.unwrap();
    assert_eq!(cache.remote().get_calls(), 2, "expired entry is refetched");
    assert!(cache.stats().expirations() >= 1);
}

#[tokio::test]
async fn test_set_is_a_direct_write() {
    let api = ScriptedApi::new();
    let cache = cache_over(api, CacheConfig::new("lru"));

    cache.set(task(5)).unwrap();
    let found = cache.retrieve(&key(5)).await.unwrap();
    assert!(found.is_some());
    assert_eq!(cache.remote().get_calls(), 0);
}

#[tokio::test]
async fn test_create_writes_through_and_caches() {
    let api = ScriptedApi::new();
    let cache = cache_over(api, CacheConfig::new("lru"));

    let created = cache.create(task(7), &[]).await.unwrap();
    assert_eq!(created.key, key(7));

    // served from the cache, no remote get
    assert!(cache.retrieve(&key(7)).await.unwrap().is_some());
    assert_eq!(cache.remote().get_calls(), 0);
}

#[tokio::test]
async fn test_update_refreshes_the_cached_copy() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));
    cache.get(&key(1)).await.unwrap();

    let mut changed = task(1);
    changed.status = "done".into();
    cache.update(&key(1), changed).await.unwrap();

    let cached = cache.retrieve(&key(1)).await.unwrap().unwrap();
    assert_eq!(cached.status, "done");
    assert_eq!(cache.remote().get_calls(), 1);
}

#[tokio::test]
async fn test_remove_deletes_remotely_and_locally() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));
    cache.get(&key(1)).await.unwrap();

    cache.remove(&key(1)).await.unwrap();
    assert!(!cache.cache_map().includes_key(&key(1)));

    // the remote no longer has it either
    let err = cache.get(&key(1)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_action_updates_the_cached_item() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));
    cache.get(&key(1)).await.unwrap();

    let acted = cache.action(&key(1), "close", &json!({})).await.unwrap();
    assert_eq!(acted.status, "close");

    let cached = cache.retrieve(&key(1)).await.unwrap().unwrap();
    assert_eq!(cached.status, "close");
}

#[tokio::test]
async fn test_facet_is_a_passthrough() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru"));

    let facet = cache.facet(&key(1), "history", &json!({})).await.unwrap();
    assert_eq!(facet, json!({ "facet": "history" }));
    assert!(cache.cache_map().is_empty(), "facet payloads are not cached");
}

#[tokio::test]
async fn test_validation_failure_is_a_hard_error() {
    let api = ScriptedApi::new();
    let cache = cache_over(api, CacheConfig::new("lru"));

    let mut wrong = task(1);
    wrong.key = ItemKey::Pri(PriKey::new("note", 1));
    let err = cache.set(wrong).unwrap_err();
    assert!(matches!(err, CacheError::ValidationFailure { .. }));
    assert!(cache.cache_map().is_empty());
}

#[tokio::test]
async fn test_oversized_item_is_returned_but_not_cached() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = cache_over(api, CacheConfig::new("lru").with_max_size_bytes(16u64));

    let fetched = cache.get(&key(1)).await.unwrap();
    assert_eq!(fetched.key, key(1));
    assert!(cache.cache_map().is_empty(), "item exceeds the whole byte budget");
}

#[tokio::test]
async fn test_concurrent_gets_agree() {
    let api = ScriptedApi::with_items([task(1)]);
    let cache = Arc::new(cache_over(api, CacheConfig::new("lru")));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { cache.get(&key(1)).await }));
    }

    for handle in handles {
        let fetched = handle.await.unwrap().unwrap();
        assert_eq!(fetched.key, key(1));
    }
    // concurrent identical fetches are not deduplicated, but at least one
    // remote call happened and the cache converged
    assert!(cache.remote().get_calls() >= 1);
    assert!(cache.cache_map().includes_key(&key(1)));
}
