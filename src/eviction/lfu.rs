use super::{select_by_score, EvictionContext, EvictionSettings, EvictionStrategy};
use crate::metadata::{monotonic_millis, MetadataProvider};
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};

const DEFAULT_DECAY_FACTOR: f64 = 0.0;
const DEFAULT_DECAY_INTERVAL_MS: u64 = 60_000;

/// Least Frequently Used: the victim is the item with the smallest
/// effective frequency.
///
/// Two optional refinements, both driven by [`EvictionSettings`]:
///
/// * time-windowed decay: every elapsed `decay_interval_ms` the frequency
///   score shrinks by `decay_factor`, so stale popularity fades
///   (`score = old * (1 - decay_factor) + 1` on each access)
/// * an approximate count-min sketch, sized by `sketch_width` and
///   `sketch_depth`, replacing exact per-entry counters at scale
///
/// Invalid settings (decay outside `[0, 1)`, a zero sketch dimension) fall
/// back to the defaults; construction never fails.
pub struct LfuStrategy {
    decay_factor: f64,
    decay_interval_ms: u64,
    sketch: Option<Mutex<CountMinSketch>>,
}

impl LfuStrategy {
    pub fn new(settings: &EvictionSettings) -> Self {
        let settings = settings.for_strategy("lfu");

        let decay_factor = match settings.decay_factor {
            Some(f) if f.is_finite() && (0.0..1.0).contains(&f) => f,
            Some(f) => {
                tracing::debug!(decay_factor = f, "invalid LFU decay factor, using default");
                DEFAULT_DECAY_FACTOR
            }
            None => DEFAULT_DECAY_FACTOR,
        };

        let decay_interval_ms = match settings.decay_interval_ms {
            Some(ms) if ms > 0 => ms,
            Some(_) => {
                tracing::debug!("zero LFU decay interval, using default");
                DEFAULT_DECAY_INTERVAL_MS
            }
            None => DEFAULT_DECAY_INTERVAL_MS,
        };

        let sketch = match (settings.sketch_width, settings.sketch_depth) {
            (Some(width), Some(depth)) if width > 0 && depth > 0 => {
                Some(Mutex::new(CountMinSketch::new(width, depth)))
            }
            (Some(_), Some(_)) => {
                tracing::debug!("zero sketch dimension, disabling LFU sketch");
                None
            }
            _ => None,
        };

        Self {
            decay_factor,
            decay_interval_ms,
            sketch,
        }
    }

    /// Frequency score of an entry as of `now`, with pending decay
    /// intervals applied.
    fn effective_frequency(&self, key: &str, provider: &MetadataProvider, now: u64) -> f64 {
        if let Some(sketch) = &self.sketch {
            return sketch.lock().estimate(key) as f64;
        }
        match provider.get_metadata(key) {
            Some(meta) => self.decayed(meta.frequency_score, meta.last_frequency_update, now),
            None => 0.0,
        }
    }

    fn decayed(&self, score: f64, last_update: u64, now: u64) -> f64 {
        if self.decay_factor == 0.0 {
            return score;
        }
        let periods = now.saturating_sub(last_update) / self.decay_interval_ms;
        score * (1.0 - self.decay_factor).powi(periods.min(u32::MAX as u64) as i32)
    }
}

impl EvictionStrategy for LfuStrategy {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn select_for_eviction(
        &self,
        provider: &MetadataProvider,
        ctx: &EvictionContext,
    ) -> Vec<String> {
        let now = monotonic_millis();
        select_by_score(provider, ctx, |key, _| {
            self.effective_frequency(key, provider, now)
        })
    }

    fn on_item_accessed(&self, key: &str, provider: &MetadataProvider) {
        provider.record_access(key);

        if let Some(sketch) = &self.sketch {
            sketch.lock().increment(key);
        }

        if let Some(mut meta) = provider.get_metadata(key) {
            let now = monotonic_millis();
            meta.frequency_score = self.decayed(meta.frequency_score, meta.last_frequency_update, now) + 1.0;
            meta.last_frequency_update = now;
            provider.set_metadata(key, meta);
        }
    }
}

/// Fixed-size approximate frequency counter.
///
/// Each of `depth` rows hashes the key with a different seed into `width`
/// counters; the estimate is the minimum across rows, an upper bound on the
/// true count that degrades gracefully under collisions.
pub(crate) struct CountMinSketch {
    width: usize,
    depth: usize,
    counters: Vec<u64>,
}

impl CountMinSketch {
    pub(crate) fn new(width: usize, depth: usize) -> Self {
        Self {
            width,
            depth,
            counters: vec![0; width * depth],
        }
    }

    fn index(&self, key: &str, row: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        (row as u64).hash(&mut hasher);
        key.hash(&mut hasher);
        row * self.width + (hasher.finish() as usize % self.width)
    }

    pub(crate) fn increment(&mut self, key: &str) {
        for row in 0..self.depth {
            let idx = self.index(key, row);
            self.counters[idx] = self.counters[idx].saturating_add(1);
        }
    }

    pub(crate) fn estimate(&self, key: &str) -> u64 {
        (0..self.depth)
            .map(|row| self.counters[self.index(key, row)])
            .min()
            .unwrap_or(0)
    }
}
