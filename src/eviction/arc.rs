use super::{EvictionContext, EvictionSettings, EvictionStrategy};
use crate::metadata::MetadataProvider;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

const DEFAULT_CAPACITY: usize = 1_000;

/// Adaptive Replacement Cache.
///
/// Entries live in one of two resident lists: T1 holds keys seen once
/// (recency), T2 holds keys seen more than once (frequency). Evicted keys
/// linger in the ghost lists B1/B2, key only. A re-admission that hits a
/// ghost list adapts the target size `p` of T1 toward the list that hit:
/// B1 hits grow `p` (recency is being punished), B2 hits shrink it.
///
/// Victims come from T1 while it exceeds `p`, from T2 otherwise. Ghost
/// lists are trimmed oldest-first to the capacity parameter, which is the
/// configured item limit or the `capacity` setting when the cache is only
/// byte-bounded.
pub struct ArcStrategy {
    fallback_capacity: usize,
    state: Mutex<ArcState>,
}

#[derive(Default)]
struct ArcState {
    t1: VecDeque<String>,
    t2: VecDeque<String>,
    b1: VecDeque<String>,
    b2: VecDeque<String>,
    p: usize,
}

impl ArcState {
    fn remove_from(list: &mut VecDeque<String>, key: &str) -> bool {
        if let Some(pos) = list.iter().position(|k| k == key) {
            list.remove(pos);
            true
        } else {
            false
        }
    }

    fn trim_ghosts(&mut self, capacity: usize) {
        while self.b1.len() > capacity {
            self.b1.pop_front();
        }
        while self.b2.len() > capacity {
            self.b2.pop_front();
        }
    }
}

impl ArcStrategy {
    pub fn new(settings: &EvictionSettings) -> Self {
        let settings = settings.for_strategy("arc");
        let fallback_capacity = match settings.capacity {
            Some(cap) if cap > 0 => cap,
            Some(_) => {
                tracing::debug!("zero ARC capacity, using default");
                DEFAULT_CAPACITY
            }
            None => DEFAULT_CAPACITY,
        };
        Self {
            fallback_capacity,
            state: Mutex::new(ArcState::default()),
        }
    }

    fn capacity(&self, provider: &MetadataProvider) -> usize {
        provider
            .size_limits()
            .max_items
            .unwrap_or(self.fallback_capacity)
            .max(1)
    }
}

impl EvictionStrategy for ArcStrategy {
    fn name(&self) -> &'static str {
        "arc"
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

        let sizes: HashMap<String, u64> = provider
            .get_all_metadata()
            .into_iter()
            .map(|(key, meta)| (key, meta.estimated_size))
            .collect();

        let state = self.state.lock();
        let mut t1 = state.t1.clone();
        let mut t2 = state.t2.clone();
        let p = state.p;
        drop(state);

        // entries the lists never saw (strategy attached mid-life) are
        // treated as the coldest recency candidates
        let known: HashSet<&String> = t1.iter().chain(t2.iter()).collect();
        let mut unknown: Vec<String> = sizes
            .keys()
            .filter(|k| !known.contains(k))
            .cloned()
            .collect();
        unknown.sort();
        for key in unknown.into_iter().rev() {
            t1.push_front(key);
        }

        let mut victims = Vec::new();
        let mut freed_items = 0usize;
        let mut freed_bytes = 0u64;
        while freed_items < need_items || freed_bytes < need_bytes {
            let candidate = if !t1.is_empty() && (t1.len() > p || t2.is_empty()) {
                t1.pop_front()
            } else if !t2.is_empty() {
                t2.pop_front()
            } else {
                t1.pop_front()
            };
            match candidate {
                Some(key) => {
                    // keys no longer backed by metadata are stale list state
                    if let Some(size) = sizes.get(&key) {
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
        let capacity = self.capacity(provider);
        let mut state = self.state.lock();

        // overwrite of a resident key keeps its list position
        if state.t1.iter().any(|k| k == key) || state.t2.iter().any(|k| k == key) {
            return;
        }

        if ArcState::remove_from(&mut state.b1, key) {
            // ghost hit on the recency side: grow the T1 target
            let delta = (state.b2.len() / state.b1.len().max(1)).max(1);
            state.p = (state.p + delta).min(capacity);
            state.t2.push_back(key.to_string());
        } else if ArcState::remove_from(&mut state.b2, key) {
            // ghost hit on the frequency side: shrink the T1 target
            let delta = (state.b1.len() / state.b2.len().max(1)).max(1);
            state.p = state.p.saturating_sub(delta);
            state.t2.push_back(key.to_string());
        } else {
            state.t1.push_back(key.to_string());
        }
        state.trim_ghosts(capacity);
    }

    fn on_item_accessed(&self, key: &str, provider: &MetadataProvider) {
        provider.record_access(key);

        let mut state = self.state.lock();
        if ArcState::remove_from(&mut state.t1, key) {
            // second reference promotes to the frequency list
            state.t2.push_back(key.to_string());
        } else if ArcState::remove_from(&mut state.t2, key) {
            state.t2.push_back(key.to_string());
        }
    }

    fn on_item_removed(&self, key: &str, provider: &MetadataProvider) {
        let capacity = self.capacity(provider);
        let mut state = self.state.lock();
        if ArcState::remove_from(&mut state.t1, key) {
            state.b1.push_back(key.to_string());
        } else if ArcState::remove_from(&mut state.t2, key) {
            state.b2.push_back(key.to_string());
        }
        state.trim_ghosts(capacity);
    }
}
