use super::{select_by_score, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

/// Most Recently Used: the victim is the item with the largest
/// `last_accessed_at`.
///
/// Useful for scan-like workloads where the item just read is the least
/// likely to be read again.
#[derive(Debug, Default)]
pub struct MruStrategy;

impl MruStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for MruStrategy {
    fn name(&self) -> &'static str {
        "mru"
    }

    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String> {
        // negate so the most recent sorts first
        select_by_score(provider, ctx, |_, meta| -(meta.last_accessed_at as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SizeLimits;

    fn ctx_for(provider: &MetadataProvider, max_items: usize) -> EvictionContext {
        EvictionContext::new(
            provider.current_size(),
            SizeLimits {
                max_items: Some(max_items),
                max_size_bytes: None,
            },
            8,
        )
    }

    #[test]
    fn test_most_recent_access_goes_first() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        provider.record_add("b", 8);
        provider.record_add("c", 8);
        provider.record_access("b");

        let victims = MruStrategy::new().select_for_eviction(&provider, &ctx_for(&provider, 3));
        assert_eq!(victims, vec!["b"]);
    }

    #[test]
    fn test_latest_insert_is_victim_without_accesses() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        provider.record_add("b", 8);
        provider.record_add("c", 8);

        let victims = MruStrategy::new().select_for_eviction(&provider, &ctx_for(&provider, 3));
        assert_eq!(victims, vec!["c"]);
    }

    #[test]
    fn test_empty_when_under_limits() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        let victims = MruStrategy::new().select_for_eviction(&provider, &ctx_for(&provider, 4));
        assert!(victims.is_empty());
    }
}
