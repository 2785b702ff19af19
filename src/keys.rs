use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum nesting depth of a location chain.
pub const MAX_LOCATION_DEPTH: usize = 5;

/// Normalizes a raw id to its canonical form.
///
/// Ids that look like base-10 integers are coerced to the canonical decimal
/// rendering, so `123`, `"123"` and `"0123"` all denote the same entity.
/// Anything else is kept verbatim. The coercion direction (towards the
/// canonical string) is fixed for the lifetime of the process, which keeps
/// `set` followed by `get` of the "same" key consistent.
///
/// # Examples
///
/// ```
/// use locus_cache::keys::normalize_id;
///
/// assert_eq!(normalize_id("123"), "123");
/// assert_eq!(normalize_id("0042"), "42");
/// assert_eq!(normalize_id("abc-123"), "abc-123");
/// ```
pub fn normalize_id(raw: &str) -> String {
    match raw.parse::<i128>() {
        Ok(n) => n.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// A primary key: the kind of an entity plus its primary id.
///
/// Keys are value types with a total order and a deterministic string form.
/// Two keys are equal iff their kinds and normalized ids match, so a key
/// built from the number `123` equals a key built from the string `"123"`.
///
/// # Examples
///
/// ```
/// use locus_cache::keys::PriKey;
///
/// let a = PriKey::new("task", 123);
/// let b = PriKey::new("task", "123");
/// assert_eq!(a, b);
/// assert_eq!(a.canonical(), "task:123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriKey {
    kt: String,
    pk: String,
}

impl PriKey {
    /// Creates a primary key; the id is normalized (see [`normalize_id`]).
    pub fn new(kt: impl Into<String>, pk: impl ToString) -> Self {
        Self {
            kt: kt.into(),
            pk: normalize_id(&pk.to_string()),
        }
    }

    /// The kind of the entity this key identifies.
    pub fn kt(&self) -> &str {
        &self.kt
    }

    /// The normalized primary id.
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// The deterministic string form, `kind:id`.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kt, self.pk)
    }
}

/// A single location link: one level of the container chain.
///
/// # Examples
///
/// ```
/// use locus_cache::keys::LocKey;
///
/// let loc = LocKey::new("container", "c1");
/// assert_eq!(loc.kt(), "container");
/// assert_eq!(loc.lk(), "c1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocKey {
    kt: String,
    lk: String,
}

impl LocKey {
    /// Creates a location key; the id is normalized (see [`normalize_id`]).
    pub fn new(kt: impl Into<String>, lk: impl ToString) -> Self {
        Self {
            kt: kt.into(),
            lk: normalize_id(&lk.to_string()),
        }
    }

    /// The kind of the container.
    pub fn kt(&self) -> &str {
        &self.kt
    }

    /// The normalized location id.
    pub fn lk(&self) -> &str {
        &self.lk
    }

    /// The string form of this single link, `kind:id`.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kt, self.lk)
    }
}

/// Renders a location chain as its canonical string form.
///
/// Links are joined with `/` in order from the innermost container outwards.
/// The empty chain renders as the empty string.
pub fn canonical_locations(loc: &[LocKey]) -> String {
    loc.iter()
        .map(LocKey::canonical)
        .collect::<Vec<_>>()
        .join("/")
}

/// A composite key: a primary key nested inside an ordered chain of
/// enclosing containers.
///
/// The location chain names successively enclosing containers, innermost
/// first, up to [`MAX_LOCATION_DEPTH`] levels.
///
/// # Examples
///
/// ```
/// use locus_cache::keys::{ComKey, LocKey};
///
/// let key = ComKey::new("task", 7, vec![LocKey::new("project", "p1")]);
/// assert_eq!(key.canonical(), "task:7@project:p1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComKey {
    kt: String,
    pk: String,
    loc: Vec<LocKey>,
}

impl ComKey {
    /// Creates a composite key; both the primary id and every location id
    /// are normalized.
    pub fn new(kt: impl Into<String>, pk: impl ToString, loc: Vec<LocKey>) -> Self {
        Self {
            kt: kt.into(),
            pk: normalize_id(&pk.to_string()),
            loc,
        }
    }

    /// The kind of the entity this key identifies.
    pub fn kt(&self) -> &str {
        &self.kt
    }

    /// The normalized primary id.
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// The location chain, innermost container first.
    pub fn loc(&self) -> &[LocKey] {
        &self.loc
    }

    /// The deterministic string form, `kind:id@loc1/loc2/...`.
    pub fn canonical(&self) -> String {
        format!("{}:{}@{}", self.kt, self.pk, canonical_locations(&self.loc))
    }
}

/// Either a primary or a composite key.
///
/// This is the key type items carry and the cache map stores. The canonical
/// string form is the internal map key throughout the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKey {
    Pri(PriKey),
    Com(ComKey),
}

impl ItemKey {
    /// The kind of the entity this key identifies.
    pub fn kt(&self) -> &str {
        match self {
            ItemKey::Pri(k) => k.kt(),
            ItemKey::Com(k) => k.kt(),
        }
    }

    /// The normalized primary id.
    pub fn pk(&self) -> &str {
        match self {
            ItemKey::Pri(k) => k.pk(),
            ItemKey::Com(k) => k.pk(),
        }
    }

    /// The location chain; empty for a primary key.
    pub fn loc(&self) -> &[LocKey] {
        match self {
            ItemKey::Pri(_) => &[],
            ItemKey::Com(k) => k.loc(),
        }
    }

    /// The deterministic string form used as the internal map key.
    pub fn canonical(&self) -> String {
        match self {
            ItemKey::Pri(k) => k.canonical(),
            ItemKey::Com(k) => k.canonical(),
        }
    }

    /// Returns true when this key lives at or below the given location
    /// prefix. The empty prefix matches every key; a non-empty prefix only
    /// matches composite keys whose chain starts with it.
    ///
    /// # Examples
    ///
    /// ```
    /// use locus_cache::keys::{ComKey, ItemKey, LocKey, PriKey};
    ///
    /// let inside = ItemKey::Com(ComKey::new(
    ///     "task",
    ///     1,
    ///     vec![LocKey::new("project", "p1"), LocKey::new("org", "o1")],
    /// ));
    /// let outside = ItemKey::Pri(PriKey::new("task", 2));
    ///
    /// let prefix = [LocKey::new("project", "p1")];
    /// assert!(inside.has_location_prefix(&prefix));
    /// assert!(!outside.has_location_prefix(&prefix));
    /// assert!(outside.has_location_prefix(&[]));
    /// ```
    pub fn has_location_prefix(&self, prefix: &[LocKey]) -> bool {
        if prefix.is_empty() {
            return true;
        }
        let loc = self.loc();
        loc.len() >= prefix.len() && loc[..prefix.len()] == *prefix
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<PriKey> for ItemKey {
    fn from(k: PriKey) -> Self {
        ItemKey::Pri(k)
    }
}

impl From<ComKey> for ItemKey {
    fn from(k: ComKey) -> Self {
        ItemKey::Com(k)
    }
}
