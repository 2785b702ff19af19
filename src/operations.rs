use crate::cache_map::CacheMap;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, CacheEventEmitter};
use crate::eviction::EvictionManager;
use crate::item::CachedItem;
use crate::keys::{ItemKey, LocKey};
use crate::query::{finder_shape, query_hash, ItemQuery};
use crate::remote::ItemApi;
use crate::size_estimator::estimate_size;
use crate::stats::CacheStats;
use crate::ttl::TtlManager;
use serde_json::Value;
use std::collections::BTreeMap;

/// Namespace prefix keeping query-result TTL entries apart from item keys.
const QUERY_TTL_PREFIX: &str = "q::";

/// The read-through cache facade.
///
/// `ItemCache` coordinates the cache map, TTL manager, eviction manager,
/// event emitter and the remote [`ItemApi`]:
///
/// * `get` / `retrieve` serve single items; `get` falls through to the
///   remote on a miss, `retrieve` never does
/// * `all` / `find` / `find_one` serve query results, caching the observed
///   key lists under stable fingerprints and re-consulting the remote the
///   moment a listed item disappears
/// * `create` / `update` / `remove` / `action` write through to the remote
///   and keep the cache and its derived query state consistent
///
/// Reads never hold internal locks across remote calls, and a cancelled
/// operation leaves any already-committed cache writes in place. With
/// `bypass_cache` configured, every operation goes straight to the remote
/// and writes nothing.
///
/// # Examples
///
/// ```ignore
/// let cache = ItemCache::new(api, vec!["task".into()], CacheConfig::new("lru"))?;
///
/// let key = ItemKey::Pri(PriKey::new("task", 42));
/// let task = cache.get(&key).await?;        // remote fetch, then cached
/// let again = cache.get(&key).await?;       // served from the cache
/// assert_eq!(cache.stats().hits(), 1);
/// ```
pub struct ItemCache<V: CachedItem, A: ItemApi<V>> {
    map: CacheMap<V>,
    api: A,
    ttl: TtlManager,
    eviction: EvictionManager,
    emitter: CacheEventEmitter<V>,
    stats: CacheStats,
    bypass_cache: bool,
}

impl<V: CachedItem, A: ItemApi<V>> std::fmt::Debug for ItemCache<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCache")
            .field("stats", &self.stats)
            .field("bypass_cache", &self.bypass_cache)
            .finish_non_exhaustive()
    }
}

impl<V, A> ItemCache<V, A>
where
    V: CachedItem,
    A: ItemApi<V>,
{
    /// Builds a cache over the given remote for the given kind chain.
    ///
    /// Fails with [`CacheError::BoundsFailure`] on invalid bounds or an
    /// unknown eviction policy name.
    pub fn new(api: A, kta: Vec<String>, config: CacheConfig) -> Result<Self> {
        let limits = config.validate()?;
        let eviction =
            EvictionManager::from_policy(&config.eviction_policy, config.eviction_config.as_ref())?;
        let map = CacheMap::new(kta, limits)?;
        Ok(Self {
            map,
            api,
            ttl: TtlManager::new(config.ttl_ms),
            eviction,
            emitter: CacheEventEmitter::new(),
            stats: CacheStats::new(),
            bypass_cache: config.bypass_cache,
        })
    }

    /// The underlying cache map.
    pub fn cache_map(&self) -> &CacheMap<V> {
        &self.map
    }

    /// The event emitter for this cache.
    pub fn events(&self) -> &CacheEventEmitter<V> {
        &self.emitter
    }

    /// Access statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The remote this cache reads through.
    pub fn remote(&self) -> &A {
        &self.api
    }

    fn query_ttl_key(hash: &str) -> String {
        format!("{QUERY_TTL_PREFIX}{hash}")
    }

    /// TTL-checked lookup. An expired entry is removed transparently and
    /// reported as absent.
    fn fresh_lookup(&self, key: &ItemKey) -> Option<V> {
        let canonical = key.canonical();
        let item = self.map.get(key)?;
        if self.ttl.is_expired(&canonical) {
            self.map.delete(key);
            self.ttl.forget(&canonical);
            self.eviction.note_removed(&canonical, self.map.metadata());
            self.stats.record_expiration();
            return None;
        }
        Some(item)
    }

    /// Evicts as needed, stores the item, and registers TTL and admission.
    /// Returns the keys evicted to make room.
    ///
    /// An item larger than the configured byte limit is skipped entirely;
    /// no sequence of evictions could admit it.
    fn store_item(&self, item: &V) -> Result<Vec<String>> {
        let key = item.key().clone();
        let canonical = key.canonical();
        let size = estimate_size(item);

        if let Some(max) = self.map.metadata().size_limits().max_size_bytes {
            if size > max {
                tracing::debug!(key = %canonical, size, max, "item exceeds the byte budget, not cached");
                return Ok(Vec::new());
            }
        }

        let evicted = self.eviction.make_room(&self.map, size);
        for victim in &evicted {
            self.ttl.forget(victim);
        }
        self.stats.record_evictions(evicted.len() as u64);

        self.map.set(&key, item.clone())?;
        self.ttl.track(&canonical, None);
        self.eviction.note_added(&canonical, size, self.map.metadata());
        Ok(evicted)
    }

    /// Resolves a cached fingerprint into items.
    ///
    /// Returns `None` and drops the entry when its TTL ran out or when any
    /// listed key no longer resolves; a partially-resolvable list is never
    /// returned.
    fn resolve_cached_result(&self, hash: &str) -> Option<Vec<V>> {
        let ttl_key = Self::query_ttl_key(hash);
        if self.ttl.is_expired(&ttl_key) {
            self.map.delete_query_result(hash);
            self.ttl.forget(&ttl_key);
            self.stats.record_expiration();
            return None;
        }

        let keys = self.map.get_query_result(hash)?;
        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.fresh_lookup(key) {
                Some(item) => items.push(item),
                None => {
                    self.map.delete_query_result(hash);
                    return None;
                }
            }
        }
        for key in &keys {
            self.eviction.note_accessed(&key.canonical(), self.map.metadata());
        }
        Some(items)
    }

    /// Records the observed result of a query and announces it.
    fn record_query_result(&self, hash: &str, items: &[V]) {
        let keys: Vec<ItemKey> = items.iter().map(|item| item.key().clone()).collect();
        self.map.set_query_result(hash, keys.clone());
        self.ttl.track(&Self::query_ttl_key(hash), None);
        self.emitter.emit(&CacheEvent::ItemsQueried {
            hash: hash.to_string(),
            keys,
        });
    }

    /// A single item by key, read through the cache.
    ///
    /// A fresh cached copy is returned directly and counted as an access.
    /// On a miss the remote is consulted and the result cached; `NotFound`
    /// from the remote propagates and leaves the cache unchanged.
    pub async fn get(&self, key: &ItemKey) -> Result<V> {
        if self.bypass_cache {
            return self.api.get(key).await;
        }

        if let Some(item) = self.fresh_lookup(key) {
            self.stats.record_hit();
            self.eviction.note_accessed(&key.canonical(), self.map.metadata());
            return Ok(item);
        }

        self.stats.record_miss();
        let fetched = self.api.get(key).await?;
        self.store_item(&fetched)?;
        self.emitter.emit(&CacheEvent::ItemRetrieved {
            key: fetched.key().clone(),
            item: fetched.clone(),
        });
        Ok(fetched)
    }

    /// The non-mutating lookup: a fresh cached copy or `None`, never a
    /// remote fetch on a miss.
    ///
    /// Under `bypass_cache` the remote is the only source, so the call is
    /// forwarded there and `NotFound` maps to `None`.
    pub async fn retrieve(&self, key: &ItemKey) -> Result<Option<V>> {
        if self.bypass_cache {
            return match self.api.get(key).await {
                Ok(item) => Ok(Some(item)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            };
        }

        match self.fresh_lookup(key) {
            Some(item) => {
                self.stats.record_hit();
                self.eviction.note_accessed(&key.canonical(), self.map.metadata());
                Ok(Some(item))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Items matching a query within the given locations.
    ///
    /// Serves the recorded result while every listed item is still
    /// resolvable, then tries the in-memory shortcut over already-cached
    /// items, and only then calls the remote. `NotFound` from the remote
    /// caches an empty result; the emptiness is itself an answer.
    pub async fn all(&self, query: &ItemQuery, locations: &[LocKey]) -> Result<Vec<V>> {
        if self.bypass_cache {
            return match self.api.all(query, locations).await {
                Ok(items) => Ok(items),
                Err(err) if err.is_not_found() => Ok(Vec::new()),
                Err(err) => Err(err),
            };
        }

        let hash = query_hash("all", self.map.primary_kind(), &query.shape(), locations);
        if let Some(items) = self.resolve_cached_result(&hash) {
            self.stats.record_hit();
            return Ok(items);
        }

        let local = self.map.query_in(query, locations);
        if !local.is_empty() {
            self.stats.record_hit();
            self.record_query_result(&hash, &local);
            return Ok(local);
        }

        self.stats.record_miss();
        match self.api.all(query, locations).await {
            Ok(items) => {
                for item in &items {
                    self.store_item(item)?;
                }
                self.record_query_result(&hash, &items);
                Ok(items)
            }
            Err(err) if err.is_not_found() => {
                self.record_query_result(&hash, &[]);
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Items produced by a named finder.
    ///
    /// Finders are opaque, so there is no in-memory shortcut: either the
    /// recorded result resolves in full or the remote is consulted.
    pub async fn find(&self, finder: &str, params: &Value, locations: &[LocKey]) -> Result<Vec<V>> {
        if self.bypass_cache {
            return match self.api.find(finder, params, locations).await {
                Ok(items) => Ok(items),
                Err(err) if err.is_not_found() => Ok(Vec::new()),
                Err(err) => Err(err),
            };
        }

        let hash = query_hash(
            "find",
            self.map.primary_kind(),
            &finder_shape(finder, params),
            locations,
        );
        if let Some(items) = self.resolve_cached_result(&hash) {
            self.stats.record_hit();
            return Ok(items);
        }

        self.stats.record_miss();
        match self.api.find(finder, params, locations).await {
            Ok(items) => {
                for item in &items {
                    self.store_item(item)?;
                }
                self.record_query_result(&hash, &items);
                Ok(items)
            }
            Err(err) if err.is_not_found() => {
                self.record_query_result(&hash, &[]);
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// The single item produced by a named finder.
    ///
    /// Object-shaped parameters double as equality predicates for the
    /// in-memory shortcut; the result is cached as a one-element list. A
    /// remote `NotFound` is cached as an empty list and re-surfaced from
    /// the cache until invalidated.
    pub async fn find_one(&self, finder: &str, params: &Value, locations: &[LocKey]) -> Result<V> {
        if self.bypass_cache {
            return self.api.find_one(finder, params, locations).await;
        }

        let hash = query_hash(
            "findOne",
            self.map.primary_kind(),
            &finder_shape(finder, params),
            locations,
        );
        if let Some(items) = self.resolve_cached_result(&hash) {
            return match items.into_iter().next() {
                Some(item) => {
                    self.stats.record_hit();
                    Ok(item)
                }
                None => {
                    self.stats.record_hit();
                    Err(CacheError::not_found(hash))
                }
            };
        }

        if let Value::Object(fields) = params {
            let probe = ItemQuery {
                filters: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
                limit: Some(1),
            };
            if let Some(item) = self.map.query_in(&probe, locations).into_iter().next() {
                self.stats.record_hit();
                self.record_query_result(&hash, std::slice::from_ref(&item));
                return Ok(item);
            }
        }

        self.stats.record_miss();
        match self.api.find_one(finder, params, locations).await {
            Ok(item) => {
                self.store_item(&item)?;
                self.record_query_result(&hash, std::slice::from_ref(&item));
                Ok(item)
            }
            Err(err) if err.is_not_found() => {
                self.record_query_result(&hash, &[]);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Creates an item through the remote and caches the stored form.
    ///
    /// A new item may join any recorded result set, and finders are
    /// opaque, so the whole query-result index is dropped.
    pub async fn create(&self, item: V, locations: &[LocKey]) -> Result<V> {
        let created = self.api.create(item, locations).await?;
        if !self.bypass_cache {
            self.store_item(&created)?;
            self.map.clear_query_results();
        }
        self.emitter.emit(&CacheEvent::ItemCreated {
            key: created.key().clone(),
            item: created.clone(),
        });
        Ok(created)
    }

    /// Updates an item through the remote and caches the stored form.
    /// Drops the query-result index: the change may move the item in or
    /// out of any recorded result.
    pub async fn update(&self, key: &ItemKey, item: V) -> Result<V> {
        let updated = self.api.update(key, item).await?;
        if !self.bypass_cache {
            self.store_item(&updated)?;
            self.map.clear_query_results();
        }
        self.emitter.emit(&CacheEvent::ItemUpdated {
            key: updated.key().clone(),
            item: updated.clone(),
        });
        Ok(updated)
    }

    /// Removes an item through the remote, then locally. Query-result
    /// entries referencing the key go with it; results that never listed
    /// it stay valid.
    pub async fn remove(&self, key: &ItemKey) -> Result<V> {
        let removed = self.api.remove(key).await?;
        if !self.bypass_cache {
            let canonical = key.canonical();
            self.map.delete(key);
            self.ttl.forget(&canonical);
            self.eviction.note_removed(&canonical, self.map.metadata());
        }
        self.emitter.emit(&CacheEvent::ItemRemoved { key: key.clone() });
        Ok(removed)
    }

    /// Reads a named facet of an item. Pure passthrough; facet payloads
    /// are opaque and never cached.
    pub async fn facet(&self, key: &ItemKey, facet: &str, params: &Value) -> Result<Value> {
        self.api.facet(key, facet, params).await
    }

    /// Invokes a named action on an item and caches the item's new form.
    /// Like `update`, the action may have changed arbitrary results, so
    /// the query-result index is dropped.
    pub async fn action(&self, key: &ItemKey, action: &str, body: &Value) -> Result<V> {
        let result = self.api.action(key, action, body).await?;
        if !self.bypass_cache {
            self.store_item(&result)?;
            self.map.clear_query_results();
        }
        self.emitter.emit(&CacheEvent::ItemUpdated {
            key: result.key().clone(),
            item: result.clone(),
        });
        Ok(result)
    }

    /// Direct local write, bypassing the remote. Returns the keys evicted
    /// to make room.
    pub fn set(&self, item: V) -> Result<Vec<String>> {
        self.store_item(&item)
    }

    /// Drops every cached item at or below the location, with its derived
    /// query state. Returns the removed keys.
    pub fn invalidate_location(&self, locations: &[LocKey]) -> Vec<ItemKey> {
        let removed = self.map.invalidate_location(locations);
        for key in &removed {
            let canonical = key.canonical();
            self.ttl.forget(&canonical);
            self.eviction.note_removed(&canonical, self.map.metadata());
        }
        self.emitter.emit(&CacheEvent::LocationInvalidated {
            locations: locations.to_vec(),
        });
        removed
    }

    /// Drops the listed cached items and their derived query state.
    pub fn invalidate_item_keys(&self, keys: &[ItemKey]) -> Vec<String> {
        let removed = self.map.invalidate_item_keys(keys);
        for canonical in &removed {
            self.ttl.forget(canonical);
            self.eviction.note_removed(canonical, self.map.metadata());
        }
        for key in keys {
            if removed.contains(&key.canonical()) {
                self.emitter.emit(&CacheEvent::ItemRemoved { key: key.clone() });
            }
        }
        removed
    }

    /// Empties the cache entirely.
    pub fn clear(&self) {
        self.map.clear();
        self.ttl.clear();
        self.emitter.emit(&CacheEvent::CacheCleared);
    }
}
