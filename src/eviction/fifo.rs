use super::{select_by_score, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

/// First In, First Out: the victim is the item with the smallest
/// `added_at`. Accesses have no effect on eviction order.
#[derive(Debug, Default)]
pub struct FifoStrategy;

impl FifoStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for FifoStrategy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String> {
        select_by_score(provider, ctx, |_, meta| meta.added_at as f64)
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
    fn test_oldest_insert_goes_first() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        provider.record_add("b", 8);
        provider.record_add("c", 8);

        let victims = FifoStrategy::new().select_for_eviction(&provider, &ctx_for(&provider, 3));
        assert_eq!(victims, vec!["a"]);
    }

    #[test]
    fn test_access_does_not_save_the_oldest() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        provider.record_add("b", 8);
        provider.record_add("c", 8);

        let fifo = FifoStrategy::new();
        fifo.on_item_accessed("a", &provider);
        fifo.on_item_accessed("a", &provider);

        let victims = fifo.select_for_eviction(&provider, &ctx_for(&provider, 3));
        assert_eq!(victims, vec!["a"]);
    }

    #[test]
    fn test_empty_when_under_limits() {
        let provider = MetadataProvider::new(SizeLimits::default());
        provider.record_add("a", 8);
        let victims = FifoStrategy::new().select_for_eviction(&provider, &ctx_for(&provider, 5));
        assert!(victims.is_empty());
    }
}
