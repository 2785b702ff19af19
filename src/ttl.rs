use crate::metadata::monotonic_millis;
use dashmap::DashMap;

/// Tracks an optional absolute expiry time per cached entry.
///
/// Expiry is advisory: nothing sweeps in the background. An entry past its
/// expiry is treated as absent on the next read, at which point the caller
/// removes it and falls through to the remote.
///
/// Entries are keyed by the same strings the cache map uses; query-result
/// fingerprints share the manager under their own namespace, so cached
/// empty results expire exactly like items.
///
/// # Examples
///
/// ```
/// use locus_cache::ttl::TtlManager;
///
/// let ttl = TtlManager::new(Some(60_000));
/// ttl.track("task:1", None);
/// assert!(!ttl.is_expired("task:1"));
///
/// let no_ttl = TtlManager::new(None);
/// no_ttl.track("task:1", None);
/// assert!(!no_ttl.is_expired("task:1"));
/// ```
#[derive(Debug)]
pub struct TtlManager {
    default_ttl_ms: Option<u64>,
    expiries: DashMap<String, u64>,
}

impl TtlManager {
    /// Creates a manager with an optional default TTL in milliseconds.
    pub fn new(default_ttl_ms: Option<u64>) -> Self {
        Self {
            default_ttl_ms,
            expiries: DashMap::new(),
        }
    }

    /// The configured default TTL.
    pub fn default_ttl_ms(&self) -> Option<u64> {
        self.default_ttl_ms
    }

    /// Records the expiry for a freshly inserted entry. `ttl_override`
    /// takes precedence over the default; with neither, the entry never
    /// expires.
    pub fn track(&self, key: &str, ttl_override: Option<u64>) {
        match ttl_override.or(self.default_ttl_ms) {
            Some(ttl_ms) => {
                self.expiries
                    .insert(key.to_string(), monotonic_millis() + ttl_ms);
            }
            None => {
                self.expiries.remove(key);
            }
        }
    }

    /// True when the entry has an expiry in the past. Untracked entries
    /// never expire.
    pub fn is_expired(&self, key: &str) -> bool {
        match self.expiries.get(key) {
            Some(expiry) => monotonic_millis() >= *expiry,
            None => false,
        }
    }

    /// Stops tracking an entry, typically when it leaves the cache.
    pub fn forget(&self, key: &str) {
        self.expiries.remove(key);
    }

    /// Drops all tracked expiries.
    pub fn clear(&self) {
        self.expiries.clear();
    }
}
