use crate::keys::ItemKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle timestamps every cached item carries.
///
/// The cache only reads these; it never writes them. They travel with the
/// item from the remote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemEvents {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ItemEvents {
    /// Events with `created_at` and `updated_at` stamped to now.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: None,
        }
    }
}

/// The contract a value must satisfy to live in the cache.
///
/// An item carries its own key and lifecycle timestamps; everything else is
/// opaque payload. The `Serialize` bound is what lets the cache evaluate
/// in-memory query predicates and estimate sizes without knowing the
/// concrete type.
///
/// # Examples
///
/// ```
/// use locus_cache::item::{CachedItem, ItemEvents};
/// use locus_cache::keys::{ItemKey, PriKey};
/// use serde::Serialize;
///
/// #[derive(Clone, Serialize)]
/// struct Task {
///     key: ItemKey,
///     events: ItemEvents,
///     title: String,
/// }
///
/// impl CachedItem for Task {
///     fn key(&self) -> &ItemKey {
///         &self.key
///     }
///     fn events(&self) -> &ItemEvents {
///         &self.events
///     }
/// }
///
/// let task = Task {
///     key: ItemKey::Pri(PriKey::new("task", 1)),
///     events: ItemEvents::now(),
///     title: "write docs".into(),
/// };
/// assert_eq!(task.key().canonical(), "task:1");
/// ```
pub trait CachedItem: Clone + Serialize + Send + Sync + 'static {
    /// The hierarchical key identifying this item.
    fn key(&self) -> &ItemKey;

    /// The lifecycle timestamps of this item.
    fn events(&self) -> &ItemEvents;
}
