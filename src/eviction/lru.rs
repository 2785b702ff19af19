use super::{select_by_score, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

/// Least Recently Used: the victim is the item with the smallest
/// `last_accessed_at`.
///
/// Accesses refresh the timestamp and bump the access counter through the
/// default access hook, so a recently read item survives an insert that a
/// colder one would not.
///
/// # Examples
///
/// ```
/// use locus_cache::eviction::{EvictionContext, EvictionStrategy, LruStrategy};
/// use locus_cache::metadata::{CurrentSize, MetadataProvider, SizeLimits};
///
/// let provider = MetadataProvider::new(SizeLimits::default());
/// provider.record_add("task:1", 8);
/// provider.record_add("task:2", 8);
/// provider.record_access("task:1");
///
/// let lru = LruStrategy::new();
/// let ctx = EvictionContext::new(
///     provider.current_size(),
///     SizeLimits { max_items: Some(2), max_size_bytes: None },
///     8,
/// );
/// assert_eq!(lru.select_for_eviction(&provider, &ctx), vec!["task:2"]);
/// ```
#[derive(Debug, Default)]
pub struct LruStrategy;

impl LruStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for LruStrategy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String> {
        select_by_score(provider, ctx, |_, meta| meta.last_accessed_at as f64)
    }
}
