use super::{EvictionContext, EvictionSettings, EvictionStrategy};
use crate::metadata::{monotonic_millis, MetadataProvider};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

const DEFAULT_CAPACITY: usize = 1_000;
const DEFAULT_PROMOTION_THRESHOLD: f64 = 2.0;
const DEFAULT_HOT_DECAY_FACTOR: f64 = 0.5;
const DEFAULT_DECAY_INTERVAL_MS: u64 = 60_000;

/// The 2Q replacement policy.
///
/// Freshly admitted keys enter the recent queue A1in, which holds at most a
/// quarter of capacity: overflow demotes the oldest A1in key into the ghost
/// queue A1out, as does eviction out of A1in. A second reference to a key
/// A1out remembers, or an effective frequency crossing the promotion
/// threshold, moves the key to the hot queue Am. Frequencies within Am
/// decay over time so old popularity fades.
///
/// Eviction prefers A1in. When A1in is empty the hot queue is evicted
/// either in plain LRU order or, with `frequency_weighted_hot` set, by the
/// score `age_minutes / max(1, freq)` with the lowest score evicted first.
pub struct TwoQStrategy {
    promotion_threshold: f64,
    hot_decay_factor: f64,
    decay_interval_ms: u64,
    frequency_weighted_hot: bool,
    fallback_capacity: usize,
    state: Mutex<TwoQState>,
}

#[derive(Default)]
struct TwoQState {
    a1in: VecDeque<String>,
    a1out: VecDeque<String>,
    am: VecDeque<String>,
    freq: HashMap<String, f64>,
    last_decay: u64,
}

impl TwoQState {
    fn remove_from(list: &mut VecDeque<String>, key: &str) -> bool {
        if let Some(pos) = list.iter().position(|k| k == key) {
            list.remove(pos);
            true
        } else {
            false
        }
    }

    fn decay_tick(&mut self, now: u64, factor: f64, interval_ms: u64) {
        if self.last_decay == 0 {
            self.last_decay = now;
            return;
        }
        let periods = now.saturating_sub(self.last_decay) / interval_ms;
        if periods == 0 || factor == 0.0 {
            return;
        }
        let multiplier = (1.0 - factor).powi(periods.min(u32::MAX as u64) as i32);
        for value in self.freq.values_mut() {
            *value *= multiplier;
        }
        self.last_decay = now;
    }
}

impl TwoQStrategy {
    pub fn new(settings: &EvictionSettings) -> Self {
        let settings = settings.for_strategy("2q");

        let promotion_threshold = match settings.promotion_threshold {
            Some(t) if t.is_finite() && t > 0.0 => t,
            Some(t) => {
                tracing::debug!(threshold = t, "invalid 2Q promotion threshold, using default");
                DEFAULT_PROMOTION_THRESHOLD
            }
            None => DEFAULT_PROMOTION_THRESHOLD,
        };

        let hot_decay_factor = match settings.decay_factor {
            Some(f) if f.is_finite() && (0.0..1.0).contains(&f) => f,
            Some(f) => {
                tracing::debug!(decay_factor = f, "invalid 2Q decay factor, using default");
                DEFAULT_HOT_DECAY_FACTOR
            }
            None => DEFAULT_HOT_DECAY_FACTOR,
        };

        let decay_interval_ms = match settings.decay_interval_ms {
            Some(ms) if ms > 0 => ms,
            Some(_) => DEFAULT_DECAY_INTERVAL_MS,
            None => DEFAULT_DECAY_INTERVAL_MS,
        };

        let fallback_capacity = match settings.capacity {
            Some(cap) if cap > 0 => cap,
            Some(_) => DEFAULT_CAPACITY,
            None => DEFAULT_CAPACITY,
        };

        Self {
            promotion_threshold,
            hot_decay_factor,
            decay_interval_ms,
            frequency_weighted_hot: settings.frequency_weighted_hot.unwrap_or(false),
            fallback_capacity,
            state: Mutex::new(TwoQState::default()),
        }
    }

    fn capacity(&self, provider: &MetadataProvider) -> usize {
        provider
            .size_limits()
            .max_items
            .unwrap_or(self.fallback_capacity)
            .max(1)
    }

    /// A1in admits a quarter of capacity before demoting oldest-first.
    fn admission_capacity(&self, provider: &MetadataProvider) -> usize {
        (self.capacity(provider) / 4).max(1)
    }

    /// A1out remembers up to half the capacity worth of evicted keys.
    fn ghost_capacity(&self, provider: &MetadataProvider) -> usize {
        (self.capacity(provider) / 2).max(1)
    }
}

impl EvictionStrategy for TwoQStrategy {
    fn name(&self) -> &'static str {
        "2q"
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

        let metadata: HashMap<String, (u64, u64)> = provider
            .get_all_metadata()
            .into_iter()
            .map(|(key, meta)| (key, (meta.estimated_size, meta.added_at)))
            .collect();

        let state = self.state.lock();
        let mut a1in = state.a1in.clone();
        let mut hot: Vec<String> = state.am.iter().cloned().collect();
        let freq = state.freq.clone();
        drop(state);

        // entries the queues never saw are the first recency candidates
        let known: HashSet<&String> = a1in.iter().chain(hot.iter()).collect();
        let mut unknown: Vec<String> = metadata
            .keys()
            .filter(|k| !known.contains(k))
            .cloned()
            .collect();
        unknown.sort();
        for key in unknown.into_iter().rev() {
            a1in.push_front(key);
        }

        if self.frequency_weighted_hot {
            let now = monotonic_millis();
            hot.sort_by(|a, b| {
                let score = |key: &String| {
                    let added_at = metadata.get(key).map(|(_, at)| *at).unwrap_or(now);
                    let age_minutes = now.saturating_sub(added_at) as f64 / 60_000.0;
                    age_minutes / freq.get(key).copied().unwrap_or(0.0).max(1.0)
                };
                score(a)
                    .partial_cmp(&score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            });
        }
        let mut hot: VecDeque<String> = hot.into();

        let mut victims = Vec::new();
        let mut freed_items = 0usize;
        let mut freed_bytes = 0u64;
        while freed_items < need_items || freed_bytes < need_bytes {
            let candidate = match a1in.pop_front() {
                Some(key) => Some(key),
                None => hot.pop_front(),
            };
            match candidate {
                Some(key) => {
                    if let Some((size, _)) = metadata.get(&key) {
                        freed_items += 1;
                        freed_bytes += *size;
                        victims.push(key);
                    }
                }
                None => break,
            }
        }
        victims
    }

    fn on_item_added(&self, key: &str, _size_bytes: u64, provider: &MetadataProvider) {
        let admission_capacity = self.admission_capacity(provider);
        let ghost_capacity = self.ghost_capacity(provider);
        let mut state = self.state.lock();
        if TwoQState::remove_from(&mut state.a1out, key) {
            // remembered from a previous life: this is the second hit
            state.am.push_back(key.to_string());
            state.freq.insert(key.to_string(), 1.0);
        } else if TwoQState::remove_from(&mut state.am, key) {
            state.am.push_back(key.to_string());
        } else if !state.a1in.iter().any(|k| k == key) {
            state.a1in.push_back(key.to_string());
            state.freq.insert(key.to_string(), 1.0);
            // the admission queue never outgrows its quarter of capacity
            while state.a1in.len() > admission_capacity {
                if let Some(demoted) = state.a1in.pop_front() {
                    state.freq.remove(&demoted);
                    state.a1out.push_back(demoted);
                }
            }
            while state.a1out.len() > ghost_capacity {
                state.a1out.pop_front();
            }
        }
    }

    fn on_item_accessed(&self, key: &str, provider: &MetadataProvider) {
        provider.record_access(key);

        let now = monotonic_millis();
        let mut state = self.state.lock();
        state.decay_tick(now, self.hot_decay_factor, self.decay_interval_ms);

        let bumped = {
            let entry = state.freq.entry(key.to_string()).or_insert(0.0);
            *entry += 1.0;
            *entry
        };

        if state.a1in.iter().any(|k| k == key) {
            if bumped >= self.promotion_threshold {
                TwoQState::remove_from(&mut state.a1in, key);
                state.am.push_back(key.to_string());
            }
        } else if TwoQState::remove_from(&mut state.am, key) {
            state.am.push_back(key.to_string());
        } else if TwoQState::remove_from(&mut state.a1out, key) {
            // still resident, demoted out of A1in: this is the second hit
            state.am.push_back(key.to_string());
        }
    }

    fn on_item_removed(&self, key: &str, provider: &MetadataProvider) {
        let ghost_capacity = self.ghost_capacity(provider);
        let mut state = self.state.lock();
        if TwoQState::remove_from(&mut state.a1in, key) {
            state.a1out.push_back(key.to_string());
            while state.a1out.len() > ghost_capacity {
                state.a1out.pop_front();
            }
        } else {
            TwoQState::remove_from(&mut state.am, key);
        }
        state.freq.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SizeLimits;

    fn provider(max_items: usize) -> MetadataProvider {
        MetadataProvider::new(SizeLimits {
            max_items: Some(max_items),
            max_size_bytes: None,
        })
    }

    fn ctx_for(provider: &MetadataProvider) -> EvictionContext {
        EvictionContext::new(provider.current_size(), provider.size_limits(), 8)
    }

    /// Demand context with its own item bound, so admission capacity (from
    /// the provider's limit) and eviction pressure can differ.
    fn demand_ctx(provider: &MetadataProvider, max_items: usize) -> EvictionContext {
        EvictionContext::new(
            provider.current_size(),
            SizeLimits {
                max_items: Some(max_items),
                max_size_bytes: None,
            },
            8,
        )
    }

    fn add(strategy: &TwoQStrategy, provider: &MetadataProvider, key: &str) {
        provider.record_add(key, 8);
        strategy.on_item_added(key, 8, provider);
    }

    #[test]
    fn test_recent_queue_evicted_before_hot() {
        let p = provider(8);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        add(&q, &p, "a");
        add(&q, &p, "b");

        // a crosses the promotion threshold (default 2.0)
        q.on_item_accessed("a", &p);
        add(&q, &p, "c");

        let victims = q.select_for_eviction(&p, &demand_ctx(&p, 3));
        assert_eq!(victims, vec!["b"], "A1in front goes before the hot queue");
    }

    #[test]
    fn test_admission_queue_is_bounded() {
        let p = provider(8); // a quarter of capacity: A1in holds 2
        let q = TwoQStrategy::new(&EvictionSettings::default());
        for key in ["a", "b", "c", "d"] {
            add(&q, &p, key);
        }

        let state = q.state.lock();
        let a1in: Vec<_> = state.a1in.iter().cloned().collect();
        let a1out: Vec<_> = state.a1out.iter().cloned().collect();
        assert_eq!(a1in, vec!["c", "d"], "oldest admissions are demoted");
        assert_eq!(a1out, vec!["a", "b"], "demotion lands in A1out oldest-first");
    }

    #[test]
    fn test_demoted_resident_key_promotes_on_access() {
        let p = provider(8);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        for key in ["a", "b", "c", "d"] {
            add(&q, &p, key);
        }

        // a was demoted to A1out but is still cached; the access is its
        // second reference
        q.on_item_accessed("a", &p);
        let state = q.state.lock();
        assert!(state.am.iter().any(|k| k == "a"));
        assert!(!state.a1out.iter().any(|k| k == "a"));
    }

    #[test]
    fn test_demoted_resident_keys_evict_first() {
        let p = provider(8);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        for key in ["a", "b", "c", "d"] {
            add(&q, &p, key);
        }

        let victims = q.select_for_eviction(&p, &demand_ctx(&p, 4));
        assert_eq!(victims, vec!["a"]);
    }

    #[test]
    fn test_hot_queue_evicted_when_recent_empty() {
        let p = provider(2);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        add(&q, &p, "a");
        add(&q, &p, "b");
        q.on_item_accessed("a", &p);
        q.on_item_accessed("b", &p);

        // both promoted: A1in is empty, Am = [a, b]
        let victims = q.select_for_eviction(&p, &ctx_for(&p));
        assert_eq!(victims, vec!["a"]);
    }

    #[test]
    fn test_ghost_readmission_promotes() {
        let p = provider(2);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        add(&q, &p, "a");

        p.delete_metadata("a");
        q.on_item_removed("a", &p);
        {
            let state = q.state.lock();
            assert!(state.a1out.iter().any(|k| k == "a"));
        }

        add(&q, &p, "a");
        let state = q.state.lock();
        assert!(state.am.iter().any(|k| k == "a"), "second hit lands in Am");
        assert!(!state.a1out.iter().any(|k| k == "a"));
    }

    #[test]
    fn test_promotion_threshold_from_settings() {
        let p = provider(5);
        let q = TwoQStrategy::new(&EvictionSettings {
            promotion_threshold: Some(3.0),
            ..Default::default()
        });
        add(&q, &p, "a");
        q.on_item_accessed("a", &p);
        assert!(q.state.lock().a1in.iter().any(|k| k == "a"));

        q.on_item_accessed("a", &p);
        assert!(q.state.lock().am.iter().any(|k| k == "a"));
    }

    #[test]
    fn test_invalid_settings_fall_back() {
        let q = TwoQStrategy::new(&EvictionSettings {
            promotion_threshold: Some(-1.0),
            decay_factor: Some(2.0),
            decay_interval_ms: Some(0),
            capacity: Some(0),
            ..Default::default()
        });
        assert_eq!(q.promotion_threshold, DEFAULT_PROMOTION_THRESHOLD);
        assert_eq!(q.hot_decay_factor, DEFAULT_HOT_DECAY_FACTOR);
        assert_eq!(q.decay_interval_ms, DEFAULT_DECAY_INTERVAL_MS);
        assert_eq!(q.fallback_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_frequency_weighted_hot_eviction() {
        let p = provider(2);
        let q = TwoQStrategy::new(&EvictionSettings {
            frequency_weighted_hot: Some(true),
            ..Default::default()
        });
        add(&q, &p, "a");
        add(&q, &p, "b");
        // promote both; b gets more accesses, a is older
        q.on_item_accessed("a", &p);
        q.on_item_accessed("b", &p);
        for _ in 0..5 {
            q.on_item_accessed("b", &p);
        }

        // score = age_minutes / max(1, freq); ages are near-identical, so
        // the frequent entry scores lower and is evicted first
        let victims = q.select_for_eviction(&p, &ctx_for(&p));
        assert_eq!(victims, vec!["b"]);
    }

    #[test]
    fn test_ghost_queue_is_bounded() {
        let p = provider(4);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        for i in 0..10 {
            let key = format!("k{i}");
            add(&q, &p, &key);
            p.delete_metadata(&key);
            q.on_item_removed(&key, &p);
        }
        assert!(q.state.lock().a1out.len() <= 2);
    }

    #[test]
    fn test_empty_when_under_limits() {
        let p = provider(10);
        let q = TwoQStrategy::new(&EvictionSettings::default());
        add(&q, &p, "a");
        assert!(q.select_for_eviction(&p, &ctx_for(&p)).is_empty());
    }
}
