use super::{take_until_satisfied, EvictionContext, EvictionStrategy};
use crate::metadata::MetadataProvider;

/// Random replacement: victims are drawn uniformly from the current
/// entries.
///
/// Sampling uses a full shuffle of the candidate list, so every entry is
/// selected with equal probability regardless of key order or insertion
/// history.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String> {
        let (need_items, need_bytes) = ctx.required_headroom();
        if need_items == 0 && need_bytes == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(String, u64, f64)> = provider
            .get_all_metadata()
            .into_iter()
            .map(|(key, meta)| (key, meta.estimated_size, 0.0))
            .collect();
        fastrand::shuffle(&mut candidates);

        take_until_satisfied(candidates, need_items, need_bytes)
    }
}
