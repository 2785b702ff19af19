use super::{create_strategy, EvictionContext, EvictionSettings, EvictionStrategy};
use crate::cache_map::CacheMap;
use crate::error::Result;
use crate::item::CachedItem;
use crate::metadata::MetadataProvider;

/// Invokes the configured strategy whenever an insertion would exceed the
/// cache bounds, and relays lifecycle hooks to it.
///
/// `make_room` runs before each insert: it builds the demand context from
/// the metadata provider, asks the strategy for victims, removes them
/// through the cache map (which cascades into the query-result index), and
/// reports the evicted keys back to the caller.
///
/// # Examples
///
/// ```
/// use locus_cache::eviction::EvictionManager;
///
/// let manager = EvictionManager::from_policy("lru", None).unwrap();
/// assert_eq!(manager.strategy_name(), "lru");
/// assert!(EvictionManager::from_policy("clock", None).is_err());
/// ```
pub struct EvictionManager {
    strategy: Box<dyn EvictionStrategy>,
}

impl EvictionManager {
    pub fn new(strategy: Box<dyn EvictionStrategy>) -> Self {
        Self { strategy }
    }

    /// Builds a manager around the named policy. Unknown names fail
    /// loudly; invalid settings values fall back to policy defaults.
    pub fn from_policy(name: &str, settings: Option<&EvictionSettings>) -> Result<Self> {
        Ok(Self::new(create_strategy(name, settings)?))
    }

    /// The lowercase name of the active policy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Frees enough room for an incoming item of `new_item_size` bytes.
    /// Returns the keys that were evicted, in eviction order.
    pub fn make_room<V: CachedItem>(&self, map: &CacheMap<V>, new_item_size: u64) -> Vec<String> {
        let provider = map.metadata();
        let ctx = EvictionContext::new(
            provider.current_size(),
            provider.size_limits(),
            new_item_size,
        );
        let victims = self.strategy.select_for_eviction(provider, &ctx);
        if victims.is_empty() {
            return victims;
        }

        let removed = map.invalidate_key_strings(&victims);
        for key in &removed {
            self.strategy.on_item_removed(key, provider);
        }
        tracing::debug!(evicted = removed.len(), policy = self.strategy.name(), "made room for insert");
        removed
    }

    /// Relays an admission to the strategy.
    pub fn note_added(&self, key: &str, size_bytes: u64, provider: &MetadataProvider) {
        self.strategy.on_item_added(key, size_bytes, provider);
    }

    /// Relays a TTL-valid user access to the strategy.
    pub fn note_accessed(&self, key: &str, provider: &MetadataProvider) {
        self.strategy.on_item_accessed(key, provider);
    }

    /// Relays an out-of-band removal (delete, TTL expiry, invalidation) to
    /// the strategy.
    pub fn note_removed(&self, key: &str, provider: &MetadataProvider) {
        self.strategy.on_item_removed(key, provider);
    }
}
