use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CLOCK_HIGH_WATER: AtomicU64 = AtomicU64::new(0);

/// Wall-clock milliseconds forced strictly monotonic.
///
/// Two calls never return the same value, so insertion and access times
/// order deterministically even when they land in the same millisecond.
pub fn monotonic_millis() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut prev = CLOCK_HIGH_WATER.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match CLOCK_HIGH_WATER.compare_exchange_weak(
            prev,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(observed) => prev = observed,
        }
    }
}

/// Per-item bookkeeping maintained by the [`MetadataProvider`].
///
/// Never exposed to cache callers; eviction strategies read it to pick
/// victims. `access_count` is signed so externally tampered counters do not
/// wrap.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub added_at: u64,
    pub last_accessed_at: u64,
    pub access_count: i64,
    pub estimated_size: u64,
    pub raw_frequency: u64,
    pub frequency_score: f64,
    pub last_frequency_update: u64,
}

impl EntryMetadata {
    /// Fresh metadata for an item added at `now` with the given size.
    pub fn new(now: u64, estimated_size: u64) -> Self {
        Self {
            added_at: now,
            last_accessed_at: now,
            access_count: 0,
            estimated_size,
            raw_frequency: 0,
            frequency_score: 0.0,
            last_frequency_update: now,
        }
    }
}

/// A snapshot of how much the cache currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentSize {
    pub item_count: usize,
    pub size_bytes: u64,
}

/// The configured bounds. `None` means unbounded for that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeLimits {
    pub max_items: Option<usize>,
    pub max_size_bytes: Option<u64>,
}

impl SizeLimits {
    /// True when neither bound is configured.
    pub fn unbounded(&self) -> bool {
        self.max_items.is_none() && self.max_size_bytes.is_none()
    }
}

/// Concurrent store of per-item metadata plus the configured limits.
///
/// Entries are keyed by the canonical key string, matching the cache map.
/// Metadata is created and deleted in the same step as the item it
/// describes; a lookup miss here means "not cached".
///
/// # Examples
///
/// ```
/// use locus_cache::metadata::{MetadataProvider, SizeLimits};
///
/// let provider = MetadataProvider::new(SizeLimits {
///     max_items: Some(100),
///     max_size_bytes: None,
/// });
///
/// provider.record_add("task:1", 256);
/// assert_eq!(provider.current_size().item_count, 1);
/// assert_eq!(provider.current_size().size_bytes, 256);
///
/// provider.record_access("task:1");
/// let meta = provider.get_metadata("task:1").unwrap();
/// assert_eq!(meta.access_count, 1);
/// ```
#[derive(Debug)]
pub struct MetadataProvider {
    entries: DashMap<String, EntryMetadata>,
    limits: SizeLimits,
}

impl MetadataProvider {
    pub fn new(limits: SizeLimits) -> Self {
        Self {
            entries: DashMap::new(),
            limits,
        }
    }

    /// Metadata for a single key, if present.
    pub fn get_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.entries.get(key).map(|e| e.clone())
    }

    /// Replaces the metadata for a key.
    pub fn set_metadata(&self, key: &str, metadata: EntryMetadata) {
        self.entries.insert(key.to_string(), metadata);
    }

    /// Removes and returns the metadata for a key.
    pub fn delete_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.entries.remove(key).map(|(_, m)| m)
    }

    /// A snapshot of every entry, sorted by key for deterministic
    /// iteration.
    pub fn get_all_metadata(&self) -> Vec<(String, EntryMetadata)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drops all metadata.
    pub fn clear_metadata(&self) {
        self.entries.clear();
    }

    /// Item count and total estimated bytes currently tracked.
    pub fn current_size(&self) -> CurrentSize {
        let mut size = CurrentSize::default();
        for entry in self.entries.iter() {
            size.item_count += 1;
            size.size_bytes += entry.estimated_size;
        }
        size
    }

    /// The configured bounds.
    pub fn size_limits(&self) -> SizeLimits {
        self.limits
    }

    /// Records an insertion. A fresh key gets new metadata; an overwrite
    /// keeps `added_at`, refreshes `last_accessed_at`, and re-estimates the
    /// size.
    pub fn record_add(&self, key: &str, estimated_size: u64) {
        let now = monotonic_millis();
        match self.entries.get_mut(key) {
            Some(mut existing) => {
                existing.last_accessed_at = now;
                existing.estimated_size = estimated_size;
            }
            None => {
                self.entries
                    .insert(key.to_string(), EntryMetadata::new(now, estimated_size));
            }
        }
    }

    /// Records a user access: refreshes `last_accessed_at` and bumps the
    /// counters.
    pub fn record_access(&self, key: &str) {
        if let Some(mut meta) = self.entries.get_mut(key) {
            let now = monotonic_millis();
            meta.last_accessed_at = now;
            meta.access_count = meta.access_count.saturating_add(1);
            meta.raw_frequency = meta.raw_frequency.saturating_add(1);
        }
    }
}
