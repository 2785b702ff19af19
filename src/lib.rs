//! # locus-cache
//!
//! A client-side read-through cache for hierarchically keyed items.
//!
//! Items are identified by a primary key, optionally nested inside a chain
//! of location keys naming enclosing containers. The cache stores both
//! individual items and the observed result sets of parameterised queries
//! against a remote item API, returning cached data while it is fresh and
//! consistent and never returning stale or torn query results.
//!
//! ## Building blocks
//!
//! - [`CacheMap`] - the typed key/value store with location-aware
//!   iteration and the query-result index
//! - [`MetadataProvider`] - per-item bookkeeping (timestamps, access
//!   counts, size estimates) and the configured bounds
//! - [`eviction`] - seven interchangeable replacement policies (LRU, LFU,
//!   FIFO, MRU, Random, ARC, 2Q) plus the manager invoking them
//! - [`TtlManager`] - advisory expiry, applied transparently on read
//! - [`ItemCache`] - the read-through operations (`get`, `retrieve`,
//!   `all`, `find`, `find_one`) and write-through passthroughs
//! - [`CacheEventEmitter`] - typed, filterable change notifications with
//!   optional debouncing
//!
//! ## Consistency
//!
//! The query-result index maps stable query fingerprints to the key lists
//! last observed as each query's result. Whenever a listed key leaves the
//! cache - deletion, eviction, TTL expiry, location invalidation - every
//! entry referencing it is dropped whole, so a later read either resolves
//! the full recorded result or goes back to the remote. A reverse index
//! from keys to fingerprints keeps that invalidation output-sensitive.
//!
//! ## Example
//!
//! ```ignore
//! use locus_cache::{CacheConfig, ItemCache, ItemKey, ItemQuery, PriKey};
//!
//! let cache = ItemCache::new(api, vec!["task".into()],
//!     CacheConfig::new("arc").with_max_items(10_000))?;
//!
//! let task = cache.get(&ItemKey::Pri(PriKey::new("task", 42))).await?;
//! let open = cache.all(&ItemQuery::new(), &[]).await?;
//! ```

pub mod cache_map;
pub mod config;
pub mod error;
pub mod events;
pub mod eviction;
pub mod item;
pub mod keys;
pub mod metadata;
pub mod operations;
pub mod query;
pub mod remote;
pub mod size_estimator;
pub mod stats;
pub mod ttl;

pub use cache_map::CacheMap;
pub use config::{CacheConfig, CacheType, SizeSpec};
pub use error::{CacheError, Result};
pub use events::{CacheEvent, CacheEventEmitter, EventFilter, EventKind, SubscriptionId};
pub use eviction::{create_strategy, EvictionContext, EvictionManager, EvictionSettings, EvictionStrategy};
pub use item::{CachedItem, ItemEvents};
pub use keys::{ComKey, ItemKey, LocKey, PriKey};
pub use metadata::{CurrentSize, EntryMetadata, MetadataProvider, SizeLimits};
pub use operations::ItemCache;
pub use query::{query_hash, ItemQuery};
pub use remote::ItemApi;
pub use size_estimator::{estimate_size, format_bytes, parse_size_limit};
pub use stats::CacheStats;
pub use ttl::TtlManager;
