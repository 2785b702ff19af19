//! Consistency of derived state: query-result invalidation on eviction,
//! location cascades, clears, and the events announcing them.

mod common;

use common::{located_task, task, ScriptedApi, Task};
use locus_cache::events::{EventFilter, EventKind};
use locus_cache::{CacheConfig, ItemCache, ItemKey, LocKey, PriKey};
use parking_lot::Mutex;
use std::sync::Arc;
use serial_test::serial;

fn nested_cache(config: CacheConfig) -> ItemCache<Task, ScriptedApi> {
    ItemCache::new(
        ScriptedApi::new(),
        vec!["task".into(), "container".into()],
        config,
    )
    .unwrap()
}

fn key(pk: &str) -> ItemKey {
    ItemKey::Pri(PriKey::new("task", pk))
}

#[tokio::test]
async fn test_eviction_invalidates_query_results() {
    let cache = nested_cache(CacheConfig::new("fifo").with_max_items(2));

    cache.set(task("1")).unwrap();
    cache.set(task("2")).unwrap();
    cache
        .cache_map()
        .set_query_result("Q", vec![key("1"), key("2")]);

    // the third insert evicts task:1, which backs Q
    cache.set(task("3")).unwrap();

    assert!(!cache.cache_map().includes_key(&key("1")));
    assert!(
        cache.cache_map().get_query_result("Q").is_none(),
        "an entry listing an evicted key cannot be trusted"
    );
}

#[tokio::test]
async fn test_location_invalidation_cascades() {
    let cache = nested_cache(CacheConfig::new("lru"));

    let p = task("1");
    let c = located_task("2", vec![LocKey::new("container", "c1")]);
    let (kp, kc) = (p.key.clone(), c.key.clone());
    cache.set(p).unwrap();
    cache.set(c).unwrap();
    cache
        .cache_map()
        .set_query_result("Q", vec![kp.clone(), kc.clone()]);

    let removed = cache.invalidate_location(&[LocKey::new("container", "c1")]);

    assert_eq!(removed, vec![kc.clone()]);
    assert!(cache.cache_map().includes_key(&kp), "top-level item survives");
    assert!(!cache.cache_map().includes_key(&kc));
    assert!(cache.cache_map().get_query_result("Q").is_none());
}

#[tokio::test]
async fn test_invalidate_item_keys_through_the_facade() {
    let cache = nested_cache(CacheConfig::new("lru"));
    cache.set(task("1")).unwrap();
    cache.set(task("2")).unwrap();
    cache
        .cache_map()
        .set_query_result("Q", vec![key("1"), key("2")]);

    let removed = cache.invalidate_item_keys(&[key("1")]);

    assert_eq!(removed, vec!["task:1".to_string()]);
    assert!(cache.cache_map().includes_key(&key("2")));
    assert!(cache.cache_map().get_query_result("Q").is_none());
}

#[tokio::test]
async fn test_clear_empties_items_and_derived_state() {
    let cache = nested_cache(CacheConfig::new("lru"));
    cache.set(task("1")).unwrap();
    cache.cache_map().set_query_result("Q", vec![key("1")]);

    cache.clear();

    assert!(cache.cache_map().is_empty());
    assert!(cache.cache_map().get_query_result("Q").is_none());
    assert_eq!(cache.cache_map().metadata().current_size().item_count, 0);
}

#[tokio::test]
async fn test_operations_announce_their_events() {
    let cache = nested_cache(CacheConfig::new("lru"));
    let seen: Arc<Mutex<Vec<EventKind>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    cache.events().subscribe(EventFilter::any(), move |event| {
        sink.lock().push(event.kind());
        Ok(())
    });

    cache.remote().put(task("9"));
    cache.get(&key("9")).await.unwrap();
    cache.create(task("10"), &[]).await.unwrap();
    cache.remove(&key("10")).await.unwrap();
    cache.invalidate_location(&[]);
    cache.clear();

    let kinds = seen.lock().clone();
    assert_eq!(
        kinds,
        vec![
            EventKind::ItemRetrieved,
            EventKind::ItemCreated,
            EventKind::ItemRemoved,
            EventKind::LocationInvalidated,
            EventKind::CacheCleared,
        ]
    );
}

#[tokio::test]
async fn test_query_events_carry_the_fingerprint() {
    let cache = nested_cache(CacheConfig::new("lru"));
    cache.remote().script_finder("byVal", vec![task("1")]);

    let seen: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    cache.events().subscribe(
        EventFilter::any().with_kind(EventKind::ItemsQueried),
        move |event| {
            if let locus_cache::CacheEvent::ItemsQueried { hash, keys } = event {
                sink.lock().push((hash.clone(), keys.len()));
            }
            Ok(())
        },
    );

    cache
        .find("byVal", &serde_json::json!({ "v": 1 }), &[])
        .await
        .unwrap();

    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert!(events[0].0.contains("byVal"));
    assert_eq!(events[0].1, 1);
}

#[tokio::test]
async fn test_key_filtered_subscription_sees_only_its_key() {
    let cache = nested_cache(CacheConfig::new("lru"));
    let count = Arc::new(Mutex::new(0usize));

    let seen = Arc::clone(&count);
    cache.events().subscribe(
        EventFilter::any().with_key(&key("1")),
        move |_| {
            *seen.lock() += 1;
            Ok(())
        },
    );

    cache.set(task("1")).unwrap();
    cache.set(task("2")).unwrap();
    cache.invalidate_item_keys(&[key("1")]);
    cache.invalidate_item_keys(&[key("2")]);

    assert_eq!(*count.lock(), 1, "only the removal of task:1 matched");
}

#[tokio::test]
#[serial]
async fn test_expired_item_invalidates_recorded_results() {
    let cache = nested_cache(CacheConfig::new("lru").with_ttl_ms(30));
    cache.remote().script_finder("byVal", vec![task("1")]);

    cache
        .find("byVal", &serde_json::json!({}), &[])
        .await
        .unwrap();
    assert_eq!(cache.remote().find_calls(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    // both the item and the fingerprint are past their TTL; the read
    // repairs the index and goes remote
    cache
        .find("byVal", &serde_json::json!({}), &[])
        .await
        .unwrap();
    assert_eq!(cache.remote().find_calls(), 2);
    assert!(cache.cache_map().includes_key(&key("1")), "refetched and recached");
}
