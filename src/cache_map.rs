use crate::error::{CacheError, Result};
use crate::item::CachedItem;
use crate::keys::{ItemKey, LocKey, MAX_LOCATION_DEPTH};
use crate::metadata::{MetadataProvider, SizeLimits};
use crate::query::ItemQuery;
use crate::size_estimator::estimate_size;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Inner maps guarded by the single per-instance lock.
struct MapState<V> {
    items: BTreeMap<String, V>,
    query_results: BTreeMap<String, Vec<ItemKey>>,
    queries_by_key: HashMap<String, HashSet<String>>,
}

impl<V> MapState<V> {
    fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            query_results: BTreeMap::new(),
            queries_by_key: HashMap::new(),
        }
    }

    /// Registers every key of a query-result list in the reverse index.
    fn index_query_result(&mut self, hash: &str, keys: &[ItemKey]) {
        for key in keys {
            self.queries_by_key
                .entry(key.canonical())
                .or_default()
                .insert(hash.to_string());
        }
    }

    /// Unregisters a query-result list from the reverse index.
    fn unindex_query_result(&mut self, hash: &str, keys: &[ItemKey]) {
        for key in keys {
            let canonical = key.canonical();
            if let Some(hashes) = self.queries_by_key.get_mut(&canonical) {
                hashes.remove(hash);
                if hashes.is_empty() {
                    self.queries_by_key.remove(&canonical);
                }
            }
        }
    }

    /// Removes every query-result entry referencing any of the given key
    /// strings. Returns the removed fingerprints.
    ///
    /// Entries are removed whole, never filtered: once a listed key is
    /// gone the cache cannot prove the residual list is still the true
    /// result of the query.
    fn drop_queries_referencing(&mut self, key_strings: &[String]) -> Vec<String> {
        let mut hashes: HashSet<String> = HashSet::new();
        for key in key_strings {
            if let Some(referencing) = self.queries_by_key.get(key) {
                hashes.extend(referencing.iter().cloned());
            }
        }

        let mut removed: Vec<String> = hashes.into_iter().collect();
        removed.sort();
        for hash in &removed {
            if let Some(keys) = self.query_results.remove(hash) {
                self.unindex_query_result(hash, &keys);
            }
        }
        removed
    }
}

/// Typed store for items of a single primary kind with a fixed location
/// schema.
///
/// A `CacheMap` holds three pieces of state under one lock:
///
/// * `items` - canonical key string to item, ordered for deterministic
///   iteration
/// * `query_results` - query fingerprint to the ordered key list last
///   observed as that query's result
/// * a reverse index from key string to the fingerprints referencing it,
///   which makes invalidation output-sensitive instead of a full sweep
///
/// Per-item metadata lives in the attached [`MetadataProvider`] and is
/// created and deleted in the same step as the item itself.
///
/// # Examples
///
/// ```
/// use locus_cache::cache_map::CacheMap;
/// use locus_cache::item::{CachedItem, ItemEvents};
/// use locus_cache::keys::{ItemKey, PriKey};
/// use locus_cache::metadata::SizeLimits;
/// use serde::Serialize;
///
/// #[derive(Clone, Serialize)]
/// struct Task {
///     key: ItemKey,
///     events: ItemEvents,
/// }
/// impl CachedItem for Task {
///     fn key(&self) -> &ItemKey { &self.key }
///     fn events(&self) -> &ItemEvents { &self.events }
/// }
///
/// let map: CacheMap<Task> =
///     CacheMap::new(vec!["task".into()], SizeLimits::default()).unwrap();
///
/// let key = ItemKey::Pri(PriKey::new("task", 1));
/// let task = Task { key: key.clone(), events: ItemEvents::now() };
/// map.set(&key, task).unwrap();
/// assert!(map.includes_key(&key));
/// ```
pub struct CacheMap<V: CachedItem> {
    kta: Vec<String>,
    state: RwLock<MapState<V>>,
    metadata: MetadataProvider,
}

impl<V: CachedItem> CacheMap<V> {
    /// Creates a cache map for the given kind chain.
    ///
    /// `kta` lists the expected kinds, primary first, then one entry per
    /// location level: `["task", "project", "org"]` stores tasks nested in
    /// projects nested in orgs. The chain is fixed for the life of the map.
    pub fn new(kta: Vec<String>, limits: SizeLimits) -> Result<Self> {
        if kta.is_empty() {
            return Err(CacheError::bounds("kta must name a primary kind"));
        }
        if kta.len() > 1 + MAX_LOCATION_DEPTH {
            return Err(CacheError::bounds(format!(
                "kta supports at most {MAX_LOCATION_DEPTH} location levels"
            )));
        }
        Ok(Self {
            kta,
            state: RwLock::new(MapState::new()),
            metadata: MetadataProvider::new(limits),
        })
    }

    /// The primary kind this map stores.
    pub fn primary_kind(&self) -> &str {
        &self.kta[0]
    }

    /// The full kind chain, primary first.
    pub fn kta(&self) -> &[String] {
        &self.kta
    }

    /// The metadata provider attached to this map.
    pub fn metadata(&self) -> &MetadataProvider {
        &self.metadata
    }

    /// Checks a key against the kind chain.
    ///
    /// The key's kind must equal the primary kind, and a composite key's
    /// location chain must match the configured location kinds level by
    /// level.
    pub fn validate_key(&self, key: &ItemKey) -> Result<()> {
        if key.kt() != self.kta[0] {
            return Err(CacheError::validation(format!(
                "expected kind {:?}, got {:?}",
                self.kta[0],
                key.kt()
            )));
        }

        let loc = key.loc();
        if loc.len() > self.kta.len() - 1 {
            return Err(CacheError::validation(format!(
                "location chain has {} levels, schema allows {}",
                loc.len(),
                self.kta.len() - 1
            )));
        }
        for (level, link) in loc.iter().enumerate() {
            let expected = &self.kta[level + 1];
            if link.kt() != expected {
                return Err(CacheError::validation(format!(
                    "location level {} expected kind {:?}, got {:?}",
                    level,
                    expected,
                    link.kt()
                )));
            }
        }
        Ok(())
    }

    /// Stores an item under a key.
    ///
    /// The key is validated against the kind chain and the item's own key
    /// must carry the map's primary kind. Overwriting an existing key keeps
    /// its `added_at` but refreshes `last_accessed_at` and the size
    /// estimate.
    pub fn set(&self, key: &ItemKey, item: V) -> Result<()> {
        self.validate_key(key)?;
        if item.key().kt() != self.kta[0] {
            return Err(CacheError::validation(format!(
                "item kind {:?} does not match map kind {:?}",
                item.key().kt(),
                self.kta[0]
            )));
        }

        let canonical = key.canonical();
        let size = estimate_size(&item);
        let mut state = self.state.write();
        state.items.insert(canonical.clone(), item);
        self.metadata.record_add(&canonical, size);
        Ok(())
    }

    /// Returns the item for a key, if present. Does not touch metadata; the
    /// caller records the access once TTL validation passes.
    pub fn get(&self, key: &ItemKey) -> Option<V> {
        self.state.read().items.get(&key.canonical()).cloned()
    }

    /// Pure membership predicate; never touches metadata.
    pub fn includes_key(&self, key: &ItemKey) -> bool {
        self.state.read().items.contains_key(&key.canonical())
    }

    /// Removes an item, its metadata, and every query-result entry
    /// referencing it. Returns the removed item.
    pub fn delete(&self, key: &ItemKey) -> Option<V> {
        let canonical = key.canonical();
        let mut state = self.state.write();
        let removed = state.items.remove(&canonical);
        if removed.is_some() {
            self.metadata.delete_metadata(&canonical);
            state.drop_queries_referencing(&[canonical]);
        }
        removed
    }

    /// Every stored key, in deterministic order.
    pub fn item_keys(&self) -> Vec<ItemKey> {
        self.state
            .read()
            .items
            .values()
            .map(|item| item.key().clone())
            .collect()
    }

    /// Every stored item, in deterministic order.
    pub fn values(&self) -> Vec<V> {
        self.state.read().items.values().cloned().collect()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// True when no items are stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Items at or below the given location prefix. The empty prefix
    /// returns every item.
    pub fn all_in(&self, locations: &[LocKey]) -> Vec<V> {
        self.state
            .read()
            .items
            .values()
            .filter(|item| item.key().has_location_prefix(locations))
            .cloned()
            .collect()
    }

    /// In-memory evaluation of a query over items restricted to a location
    /// prefix. Best-effort: it sees only what is cached.
    pub fn query_in(&self, query: &ItemQuery, locations: &[LocKey]) -> Vec<V> {
        let mut matched: Vec<V> = Vec::new();
        let state = self.state.read();
        for item in state.items.values() {
            if !item.key().has_location_prefix(locations) {
                continue;
            }
            let rendered = match serde_json::to_value(item) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if query.matches(&rendered) {
                matched.push(item.clone());
                if let Some(limit) = query.limit {
                    if matched.len() >= limit {
                        break;
                    }
                }
            }
        }
        matched
    }

    /// Records the observed result of a query. No validation of key
    /// presence is performed; the read path resolves and repairs.
    pub fn set_query_result(&self, hash: &str, keys: Vec<ItemKey>) {
        let mut state = self.state.write();
        if let Some(previous) = state.query_results.remove(hash) {
            state.unindex_query_result(hash, &previous);
        }
        state.index_query_result(hash, &keys);
        state.query_results.insert(hash.to_string(), keys);
    }

    /// The recorded key list for a fingerprint, if any.
    pub fn get_query_result(&self, hash: &str) -> Option<Vec<ItemKey>> {
        self.state.read().query_results.get(hash).cloned()
    }

    /// True when a result is recorded for the fingerprint.
    pub fn has_query_result(&self, hash: &str) -> bool {
        self.state.read().query_results.contains_key(hash)
    }

    /// Drops a single query-result entry.
    pub fn delete_query_result(&self, hash: &str) {
        let mut state = self.state.write();
        if let Some(keys) = state.query_results.remove(hash) {
            state.unindex_query_result(hash, &keys);
        }
    }

    /// Drops every query-result entry. Used by write-through operations
    /// whose effect on arbitrary result sets cannot be bounded.
    pub fn clear_query_results(&self) {
        let mut state = self.state.write();
        state.query_results.clear();
        state.queries_by_key.clear();
    }

    /// Number of recorded query results.
    pub fn query_result_count(&self) -> usize {
        self.state.read().query_results.len()
    }

    /// Deletes every item at or below the given location, along with its
    /// metadata and any query-result entry referencing it. Returns the
    /// removed keys.
    pub fn invalidate_location(&self, locations: &[LocKey]) -> Vec<ItemKey> {
        let mut state = self.state.write();
        let doomed: Vec<(String, ItemKey)> = state
            .items
            .iter()
            .filter(|(_, item)| item.key().has_location_prefix(locations))
            .map(|(canonical, item)| (canonical.clone(), item.key().clone()))
            .collect();

        let mut removed_keys = Vec::with_capacity(doomed.len());
        let mut removed_strings = Vec::with_capacity(doomed.len());
        for (canonical, key) in doomed {
            state.items.remove(&canonical);
            self.metadata.delete_metadata(&canonical);
            removed_strings.push(canonical);
            removed_keys.push(key);
        }
        state.drop_queries_referencing(&removed_strings);
        removed_keys
    }

    /// Deletes the listed items along with their metadata and any
    /// query-result entry referencing them. Returns the canonical strings
    /// of the keys actually removed.
    pub fn invalidate_item_keys(&self, keys: &[ItemKey]) -> Vec<String> {
        let strings: Vec<String> = keys.iter().map(ItemKey::canonical).collect();
        self.invalidate_key_strings(&strings)
    }

    /// As [`invalidate_item_keys`](Self::invalidate_item_keys), addressed
    /// by canonical key strings. This is the removal path the eviction
    /// manager uses.
    pub fn invalidate_key_strings(&self, key_strings: &[String]) -> Vec<String> {
        let mut state = self.state.write();
        let mut removed = Vec::new();
        for canonical in key_strings {
            if state.items.remove(canonical).is_some() {
                self.metadata.delete_metadata(canonical);
                removed.push(canonical.clone());
            }
        }
        if !removed.is_empty() {
            state.drop_queries_referencing(&removed);
        }
        removed
    }

    /// Removes all items, metadata, and query-result entries.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.items.clear();
        state.query_results.clear();
        state.queries_by_key.clear();
        self.metadata.clear_metadata();
    }
}
