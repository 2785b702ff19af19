use crate::item::CachedItem;
use crate::keys::{ItemKey, LocKey};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A typed cache event.
///
/// Events are published synchronously by the operations layer as cache
/// state changes. Payload-carrying variants clone the item so listeners
/// never observe the store itself.
#[derive(Clone)]
pub enum CacheEvent<V: CachedItem> {
    ItemCreated { key: ItemKey, item: V },
    ItemUpdated { key: ItemKey, item: V },
    ItemRemoved { key: ItemKey },
    ItemRetrieved { key: ItemKey, item: V },
    ItemsQueried { hash: String, keys: Vec<ItemKey> },
    LocationInvalidated { locations: Vec<LocKey> },
    CacheCleared,
}

impl<V: CachedItem> CacheEvent<V> {
    /// The kind tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            CacheEvent::ItemCreated { .. } => EventKind::ItemCreated,
            CacheEvent::ItemUpdated { .. } => EventKind::ItemUpdated,
            CacheEvent::ItemRemoved { .. } => EventKind::ItemRemoved,
            CacheEvent::ItemRetrieved { .. } => EventKind::ItemRetrieved,
            CacheEvent::ItemsQueried { .. } => EventKind::ItemsQueried,
            CacheEvent::LocationInvalidated { .. } => EventKind::LocationInvalidated,
            CacheEvent::CacheCleared => EventKind::CacheCleared,
        }
    }

    /// The keys this event concerns, if any.
    pub fn keys(&self) -> Vec<&ItemKey> {
        match self {
            CacheEvent::ItemCreated { key, .. }
            | CacheEvent::ItemUpdated { key, .. }
            | CacheEvent::ItemRemoved { key }
            | CacheEvent::ItemRetrieved { key, .. } => vec![key],
            CacheEvent::ItemsQueried { keys, .. } => keys.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Discriminant of [`CacheEvent`], used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemCreated,
    ItemUpdated,
    ItemRemoved,
    ItemRetrieved,
    ItemsQueried,
    LocationInvalidated,
    CacheCleared,
}

/// Error type a listener may return; routed to the subscriber's `on_error`
/// hook or logged.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result a listener returns. The emitting operation is never affected by
/// a listener failure.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Selects which events reach a subscriber.
///
/// All configured dimensions must match: kind membership, key membership
/// (compared on canonical forms, so id normalization applies), location
/// prefix, and query fingerprint. An empty filter matches everything.
///
/// # Examples
///
/// ```
/// use locus_cache::events::{EventFilter, EventKind};
/// use locus_cache::keys::{ItemKey, PriKey};
///
/// let filter = EventFilter::any()
///     .with_kind(EventKind::ItemRemoved)
///     .with_key(&ItemKey::Pri(PriKey::new("task", 1)));
/// ```
#[derive(Clone, Default)]
pub struct EventFilter {
    kinds: Option<HashSet<EventKind>>,
    keys: Option<HashSet<String>>,
    location: Option<Vec<LocKey>>,
    query_hash: Option<String>,
}

impl EventFilter {
    /// A filter matching every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to the given kind; may be called repeatedly to allow
    /// several kinds.
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kinds.get_or_insert_with(HashSet::new).insert(kind);
        self
    }

    /// Restricts to events touching the given key (after normalization).
    pub fn with_key(mut self, key: &ItemKey) -> Self {
        self.keys
            .get_or_insert_with(HashSet::new)
            .insert(key.canonical());
        self
    }

    /// Restricts to events at or below the given location prefix.
    pub fn with_location(mut self, location: Vec<LocKey>) -> Self {
        self.location = Some(location);
        self
    }

    /// Restricts to query events carrying the given fingerprint.
    pub fn with_query_hash(mut self, hash: impl Into<String>) -> Self {
        self.query_hash = Some(hash.into());
        self
    }

    /// True when the event passes every configured dimension.
    pub fn matches<V: CachedItem>(&self, event: &CacheEvent<V>) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }

        if let Some(keys) = &self.keys {
            let touched = event.keys();
            if !touched.iter().any(|k| keys.contains(&k.canonical())) {
                return false;
            }
        }

        if let Some(location) = &self.location {
            let in_scope = match event {
                CacheEvent::LocationInvalidated { locations } => {
                    locations.len() >= location.len() && locations[..location.len()] == *location
                }
                CacheEvent::CacheCleared => true,
                other => other.keys().iter().any(|k| k.has_location_prefix(location)),
            };
            if !in_scope {
                return false;
            }
        }

        if let Some(hash) = &self.query_hash {
            match event {
                CacheEvent::ItemsQueried { hash: h, .. } => {
                    if h != hash {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        true
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<V> = Arc<dyn Fn(&CacheEvent<V>) -> ListenerResult + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&ListenerError) + Send + Sync>;

struct ListenerEntry<V: CachedItem> {
    id: u64,
    filter: EventFilter,
    handler: Handler<V>,
    on_error: Option<ErrorHook>,
    debounce: Option<Duration>,
    pending: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

/// Synchronous, filterable event fan-out.
///
/// Listeners run on the emitting task. A failing listener never interrupts
/// the emitter: the error goes to the subscriber's `on_error` hook when one
/// was registered, otherwise it is logged.
///
/// Debounced subscriptions collapse a burst into its last event, delivered
/// on a timer after the quiet period; unsubscribing aborts any pending
/// delivery. Debounced delivery needs a tokio runtime on the emitting
/// thread; plain subscriptions have no runtime requirement.
pub struct CacheEventEmitter<V: CachedItem> {
    listeners: RwLock<Vec<ListenerEntry<V>>>,
    next_id: AtomicU64,
}

impl<V: CachedItem> CacheEventEmitter<V> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener for events passing the filter.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent<V>) -> ListenerResult + Send + Sync + 'static,
    {
        self.subscribe_with(filter, handler, None, None)
    }

    /// Registers a listener with an optional error hook and an optional
    /// debounce quiet period.
    pub fn subscribe_with<F>(
        &self,
        filter: EventFilter,
        handler: F,
        on_error: Option<Arc<dyn Fn(&ListenerError) + Send + Sync>>,
        debounce: Option<Duration>,
    ) -> SubscriptionId
    where
        F: Fn(&CacheEvent<V>) -> ListenerResult + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push(ListenerEntry {
            id,
            filter,
            handler: Arc::new(handler),
            on_error,
            debounce,
            pending: Arc::new(Mutex::new(None)),
        });
        SubscriptionId(id)
    }

    /// Removes a listener. Any debounced delivery still pending is
    /// cancelled. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        match listeners.iter().position(|entry| entry.id == id.0) {
            Some(pos) => {
                let entry = listeners.remove(pos);
                if let Some(handle) = entry.pending.lock().take() {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Publishes an event to every matching listener.
    pub fn emit(&self, event: &CacheEvent<V>) {
        let listeners = self.listeners.read();
        for entry in listeners.iter() {
            if !entry.filter.matches(event) {
                continue;
            }
            match entry.debounce {
                Some(quiet) => {
                    let handler = Arc::clone(&entry.handler);
                    let on_error = entry.on_error.clone();
                    let owned = event.clone();
                    let mut pending = entry.pending.lock();
                    if let Some(previous) = pending.take() {
                        previous.abort();
                    }
                    *pending = Some(tokio::spawn(async move {
                        tokio::time::sleep(quiet).await;
                        dispatch(&handler, &on_error, &owned);
                    }));
                }
                None => dispatch(&entry.handler, &entry.on_error, event),
            }
        }
    }
}

impl<V: CachedItem> Default for CacheEventEmitter<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch<V: CachedItem>(
    handler: &Handler<V>,
    on_error: &Option<ErrorHook>,
    event: &CacheEvent<V>,
) {
    if let Err(err) = handler(event) {
        match on_error {
            Some(hook) => hook(&err),
            None => tracing::warn!(error = %err, "cache event listener failed"),
        }
    }
}
