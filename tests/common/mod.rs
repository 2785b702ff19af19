//! Shared fixtures: a task item type and a scripted in-process remote
//! with call counting.
#![allow(dead_code)]

use async_trait::async_trait;
use locus_cache::item::{CachedItem, ItemEvents};
use locus_cache::keys::{ComKey, ItemKey, LocKey, PriKey};
use locus_cache::query::ItemQuery;
use locus_cache::remote::ItemApi;
use locus_cache::{CacheError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub key: ItemKey,
    pub events: ItemEvents,
    pub status: String,
    pub val: i64,
}

impl CachedItem for Task {
    fn key(&self) -> &ItemKey {
        &self.key
    }
    fn events(&self) -> &ItemEvents {
        &self.events
    }
}

pub fn task(pk: impl ToString) -> Task {
    Task {
        key: ItemKey::Pri(PriKey::new("task", pk)),
        events: ItemEvents::now(),
        status: "open".into(),
        val: 0,
    }
}

pub fn located_task(pk: impl ToString, loc: Vec<LocKey>) -> Task {
    Task {
        key: ItemKey::Com(ComKey::new("task", pk, loc)),
        events: ItemEvents::now(),
        status: "open".into(),
        val: 0,
    }
}

/// Remote double backed by in-memory maps. Finder results are scripted per
/// finder name; every operation counts its calls.
#[derive(Default)]
pub struct ScriptedApi {
    items: Mutex<HashMap<String, Task>>,
    finders: Mutex<HashMap<String, Vec<Task>>>,
    gets: AtomicUsize,
    alls: AtomicUsize,
    finds: AtomicUsize,
    find_ones: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Task>) -> Self {
        let api = Self::new();
        for item in items {
            api.put(item);
        }
        api
    }

    /// Adds or replaces an item on the remote side.
    pub fn put(&self, item: Task) {
        self.items.lock().insert(item.key.canonical(), item);
    }

    /// Removes an item on the remote side, without telling the cache.
    pub fn drop_item(&self, key: &ItemKey) {
        self.items.lock().remove(&key.canonical());
    }

    /// Scripts the result of a named finder.
    pub fn script_finder(&self, finder: &str, results: Vec<Task>) {
        self.finders.lock().insert(finder.to_string(), results);
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn all_calls(&self) -> usize {
        self.alls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn find_one_calls(&self) -> usize {
        self.find_ones.load(Ordering::SeqCst)
    }

    fn matching(&self, query: &ItemQuery, locations: &[LocKey]) -> Vec<Task> {
        let items = self.items.lock();
        let mut found: Vec<Task> = items
            .values()
            .filter(|item| item.key.has_location_prefix(locations))
            .filter(|item| {
                serde_json::to_value(item)
                    .map(|v| query.matches(&v))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        found.sort_by_key(|item| item.key.canonical());
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        found
    }
}

#[async_trait]
impl ItemApi<Task> for ScriptedApi {
    async fn all(&self, query: &ItemQuery, locations: &[LocKey]) -> Result<Vec<Task>> {
        self.alls.fetch_add(1, Ordering::SeqCst);
        let found = self.matching(query, locations);
        if found.is_empty() {
            return Err(CacheError::not_found("all"));
        }
        Ok(found)
    }

    async fn one(&self, query: &ItemQuery, locations: &[LocKey]) -> Result<Option<Task>> {
        Ok(self.matching(query, locations).into_iter().next())
    }

    async fn get(&self, key: &ItemKey) -> Result<Task> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .get(&key.canonical())
            .cloned()
            .ok_or_else(|| CacheError::not_found(key.canonical()))
    }

    async fn find(&self, finder: &str, _params: &Value, _locations: &[LocKey]) -> Result<Vec<Task>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.finders
            .lock()
            .get(finder)
            .cloned()
            .ok_or_else(|| CacheError::not_found(finder))
    }

    async fn find_one(&self, finder: &str, params: &Value, locations: &[LocKey]) -> Result<Task> {
        self.find_ones.fetch_add(1, Ordering::SeqCst);
        self.find(finder, params, locations)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::not_found(finder))
    }

    async fn create(&self, item: Task, _locations: &[LocKey]) -> Result<Task> {
        self.put(item.clone());
        Ok(item)
    }

    async fn update(&self, key: &ItemKey, item: Task) -> Result<Task> {
        if !self.items.lock().contains_key(&key.canonical()) {
            return Err(CacheError::not_found(key.canonical()));
        }
        self.put(item.clone());
        Ok(item)
    }

    async fn remove(&self, key: &ItemKey) -> Result<Task> {
        self.items
            .lock()
            .remove(&key.canonical())
            .ok_or_else(|| CacheError::not_found(key.canonical()))
    }

    async fn facet(&self, _key: &ItemKey, facet: &str, _params: &Value) -> Result<Value> {
        Ok(serde_json::json!({ "facet": facet }))
    }

    async fn action(&self, key: &ItemKey, action: &str, _body: &Value) -> Result<Task> {
        let mut items = self.items.lock();
        let item = items
            .get_mut(&key.canonical())
            .ok_or_else(|| CacheError::not_found(key.canonical()))?;
        item.status = action.to_string();
        Ok(item.clone())
    }
}
