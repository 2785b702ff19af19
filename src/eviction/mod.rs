//! Replacement policies over the shared metadata model.
//!
//! Every policy implements [`EvictionStrategy`]: a pure victim-selection
//! function plus three bookkeeping hooks. Strategies with internal state
//! (ARC, 2Q) keep it in their own fields behind a mutex; the metadata they
//! read lives in the [`MetadataProvider`].
//!
//! Strategies are constructed by name through [`create_strategy`]. Unknown
//! names fail loudly; invalid configuration values never do - the strategy
//! falls back to its defaults and keeps working.

mod arc;
mod fifo;
mod lfu;
mod lru;
mod manager;
mod mru;
mod random;
mod two_q;

pub use arc::ArcStrategy;
pub use fifo::FifoStrategy;
pub use lfu::LfuStrategy;
pub use lru::LruStrategy;
pub use manager::EvictionManager;
pub use mru::MruStrategy;
pub use random::RandomStrategy;
pub use two_q::TwoQStrategy;

use crate::error::{CacheError, Result};
use crate::metadata::{CurrentSize, EntryMetadata, MetadataProvider, SizeLimits};
use serde::Deserialize;
use std::cmp::Ordering;

/// The demand signal handed to [`EvictionStrategy::select_for_eviction`].
#[derive(Debug, Clone, Copy)]
pub struct EvictionContext {
    pub current: CurrentSize,
    pub limits: SizeLimits,
    /// Size of the item about to be inserted.
    pub new_item_size: u64,
}

impl EvictionContext {
    pub fn new(current: CurrentSize, limits: SizeLimits, new_item_size: u64) -> Self {
        Self {
            current,
            limits,
            new_item_size,
        }
    }

    /// How many items and bytes must leave so the pending insert fits.
    /// `(0, 0)` means no eviction is required.
    pub fn required_headroom(&self) -> (usize, u64) {
        let items = match self.limits.max_items {
            Some(max) => (self.current.item_count + 1).saturating_sub(max),
            None => 0,
        };
        let bytes = match self.limits.max_size_bytes {
            Some(max) => (self.current.size_bytes + self.new_item_size).saturating_sub(max),
            None => 0,
        };
        (items, bytes)
    }

    /// True when the pending insert would exceed a configured bound.
    pub fn requires_eviction(&self) -> bool {
        let (items, bytes) = self.required_headroom();
        items > 0 || bytes > 0
    }
}

/// A replacement policy.
///
/// `select_for_eviction` is a pure function of the metadata snapshot: it
/// returns an ordered victim list sufficient to bring the cache under its
/// limits once the pending insert lands, or an empty list when no eviction
/// is required. Ties between equally-scored candidates break on ascending
/// canonical key so selection is deterministic for identical metadata.
///
/// The hooks let stateful policies track admissions, re-references, and
/// removals. The default access hook records the access in the metadata
/// provider, which is all the stateless policies need.
pub trait EvictionStrategy: Send + Sync {
    /// The lowercase policy name, as accepted by [`create_strategy`].
    fn name(&self) -> &'static str;

    /// Picks victims for the pending insert described by `ctx`.
    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String>;

    /// Called after an item landed in the cache.
    fn on_item_added(&self, _key: &str, _size_bytes: u64, _provider: &MetadataProvider) {}

    /// Called on a TTL-valid user access.
    fn on_item_accessed(&self, key: &str, provider: &MetadataProvider) {
        provider.record_access(key);
    }

    /// Called after an item left the cache for any reason.
    fn on_item_removed(&self, _key: &str, _provider: &MetadataProvider) {}
}

/// Optional tuning knobs for the configurable policies.
///
/// All fields are optional and independently validated by the strategy that
/// reads them; a value that fails validation is replaced by the default
/// rather than rejected. A `kind` tag naming a different policy than the
/// one being constructed causes the whole settings object to be ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvictionSettings {
    /// Policy tag; ignored together with the rest of the settings when it
    /// names a different policy.
    pub kind: Option<String>,
    /// LFU / 2Q frequency decay per interval, in `[0, 1)`.
    pub decay_factor: Option<f64>,
    /// Length of one decay interval in milliseconds.
    pub decay_interval_ms: Option<u64>,
    /// Count-min sketch width (LFU); both dimensions must be non-zero.
    pub sketch_width: Option<usize>,
    /// Count-min sketch depth (LFU).
    pub sketch_depth: Option<usize>,
    /// 2Q: effective frequency at which an entry is promoted to the hot
    /// queue.
    pub promotion_threshold: Option<f64>,
    /// 2Q: evict the hot queue by frequency-weighted LRU instead of plain
    /// LRU.
    pub frequency_weighted_hot: Option<bool>,
    /// ARC / 2Q capacity fallback used when no item limit is configured.
    pub capacity: Option<usize>,
}

impl EvictionSettings {
    /// Returns the settings if their `kind` tag is absent or matches
    /// `strategy`, otherwise a default (everything ignored).
    pub(crate) fn for_strategy(&self, strategy: &str) -> EvictionSettings {
        match &self.kind {
            Some(kind) if kind != strategy => {
                tracing::debug!(
                    configured = %kind,
                    strategy,
                    "eviction settings tagged for another policy, using defaults"
                );
                EvictionSettings::default()
            }
            _ => self.clone(),
        }
    }
}

/// Builds a strategy by its lowercase name.
///
/// # Examples
///
/// ```
/// use locus_cache::eviction::create_strategy;
///
/// let lru = create_strategy("lru", None).unwrap();
/// assert_eq!(lru.name(), "lru");
///
/// assert!(create_strategy("LRU", None).is_err());
/// assert!(create_strategy("clock", None).is_err());
/// ```
pub fn create_strategy(
    name: &str,
    settings: Option<&EvictionSettings>,
) -> Result<Box<dyn EvictionStrategy>> {
    let settings = settings.cloned().unwrap_or_default();
    match name {
        "lru" => Ok(Box::new(LruStrategy::new())),
        "lfu" => Ok(Box::new(LfuStrategy::new(&settings))),
        "fifo" => Ok(Box::new(FifoStrategy::new())),
        "mru" => Ok(Box::new(MruStrategy::new())),
        "random" => Ok(Box::new(RandomStrategy::new())),
        "arc" => Ok(Box::new(ArcStrategy::new(&settings))),
        "2q" => Ok(Box::new(TwoQStrategy::new(&settings))),
        other => Err(CacheError::bounds(format!(
            "unknown eviction policy: {other:?}"
        ))),
    }
}

/// Victim selection shared by the score-ordered policies: sorts the
/// metadata snapshot by ascending score (ties on key) and takes victims
/// from the front until the pending insert fits.
pub(crate) fn select_by_score<F>(
    provider: &MetadataProvider,
    ctx: &EvictionContext,
    score: F,
) -> Vec<String>
where
    F: Fn(&str, &EntryMetadata) -> f64,
{
    let (need_items, need_bytes) = ctx.required_headroom();
    if need_items == 0 && need_bytes == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(String, u64, f64)> = provider
        .get_all_metadata()
        .into_iter()
        .map(|(key, meta)| {
            let s = score(&key, &meta);
            (key, meta.estimated_size, s)
        })
        .collect();
    scored.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    take_until_satisfied(scored, need_items, need_bytes)
}

/// Walks an ordered candidate list and keeps victims until the freed item
/// count and byte total both cover the demand.
pub(crate) fn take_until_satisfied(
    candidates: Vec<(String, u64, f64)>,
    need_items: usize,
    need_bytes: u64,
) -> Vec<String> {
    let mut victims = Vec::new();
    let mut freed_items = 0usize;
    let mut freed_bytes = 0u64;
    for (key, size, _) in candidates {
        if freed_items >= need_items && freed_bytes >= need_bytes {
            break;
        }
        freed_items += 1;
        freed_bytes += size;
        victims.push(key);
    }
    victims
}
