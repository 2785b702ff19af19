use crate::error::Result;
use crate::item::CachedItem;
use crate::keys::{ItemKey, LocKey};
use crate::query::ItemQuery;
use async_trait::async_trait;
use serde_json::Value;

/// The remote item API the cache reads through.
///
/// Implementations wrap whatever transport actually serves the items; the
/// cache only cares about the operation shapes and about one distinguished
/// failure: [`CacheError::NotFound`](crate::CacheError::NotFound), which
/// collection operations convert into cached empty results.
///
/// All calls may suspend; the cache never holds internal locks across
/// them.
#[async_trait]
pub trait ItemApi<V: CachedItem>: Send + Sync {
    /// Items matching a query within the given locations.
    async fn all(&self, query: &ItemQuery, locations: &[LocKey]) -> Result<Vec<V>>;

    /// The first item matching a query, or `None`.
    async fn one(&self, query: &ItemQuery, locations: &[LocKey]) -> Result<Option<V>>;

    /// A single item by key. `NotFound` when the item does not exist.
    async fn get(&self, key: &ItemKey) -> Result<V>;

    /// Items produced by a named finder with opaque parameters.
    async fn find(&self, finder: &str, params: &Value, locations: &[LocKey]) -> Result<Vec<V>>;

    /// The single item produced by a named finder.
    async fn find_one(&self, finder: &str, params: &Value, locations: &[LocKey]) -> Result<V>;

    /// Creates an item within the given locations; returns the stored
    /// form.
    async fn create(&self, item: V, locations: &[LocKey]) -> Result<V>;

    /// Replaces the item under a key; returns the stored form.
    async fn update(&self, key: &ItemKey, item: V) -> Result<V>;

    /// Removes the item under a key; returns its last stored form.
    async fn remove(&self, key: &ItemKey) -> Result<V>;

    /// Reads a named facet of an item; the result is opaque to the cache.
    async fn facet(&self, key: &ItemKey, facet: &str, params: &Value) -> Result<Value>;

    /// Invokes a named action on an item; returns the item's new form.
    async fn action(&self, key: &ItemKey, action: &str, body: &Value) -> Result<V>;
}
