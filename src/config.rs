use crate::error::{CacheError, Result};
use crate::eviction::EvictionSettings;
use crate::metadata::SizeLimits;
use crate::size_estimator::parse_size_limit;
use serde::Deserialize;

/// Which backing store a cache uses. Only the in-memory store lives in
/// this crate; persistent back-ends implement the same cache map contract
/// elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheType {
    #[default]
    InMemory,
}

/// A byte bound, given either as a number or as a size string
/// (`"512KiB"`, `"1.5GB"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(u64),
    Text(String),
}

impl SizeSpec {
    fn resolve(&self) -> Result<u64> {
        match self {
            SizeSpec::Bytes(0) => Err(CacheError::bounds("maxSizeBytes must be positive")),
            SizeSpec::Bytes(n) => Ok(*n),
            SizeSpec::Text(s) => parse_size_limit(s),
        }
    }
}

impl From<u64> for SizeSpec {
    fn from(bytes: u64) -> Self {
        SizeSpec::Bytes(bytes)
    }
}

impl From<&str> for SizeSpec {
    fn from(text: &str) -> Self {
        SizeSpec::Text(text.to_string())
    }
}

/// Construction surface of a cache instance.
///
/// Validated once at construction; invalid bounds raise
/// [`CacheError::BoundsFailure`]. The eviction policy name is lowercase
/// and case-sensitive; unknown names are rejected when the strategy is
/// built. Eviction settings, in contrast, degrade softly: invalid values
/// fall back to policy defaults.
///
/// # Examples
///
/// ```
/// use locus_cache::config::CacheConfig;
///
/// let config = CacheConfig::new("lru")
///     .with_max_items(10_000)
///     .with_max_size_bytes("64MiB")
///     .with_ttl_ms(30_000);
/// let limits = config.validate().unwrap();
/// assert_eq!(limits.max_items, Some(10_000));
/// assert_eq!(limits.max_size_bytes, Some(64 * 1024 * 1024));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_type: CacheType,
    pub max_items: Option<u64>,
    pub max_size_bytes: Option<SizeSpec>,
    pub eviction_policy: String,
    pub eviction_config: Option<EvictionSettings>,
    pub ttl_ms: Option<u64>,
    pub bypass_cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::InMemory,
            max_items: None,
            max_size_bytes: None,
            eviction_policy: "lru".to_string(),
            eviction_config: None,
            ttl_ms: None,
            bypass_cache: false,
        }
    }
}

impl CacheConfig {
    /// A config with the given eviction policy and no bounds.
    pub fn new(eviction_policy: impl Into<String>) -> Self {
        Self {
            eviction_policy: eviction_policy.into(),
            ..Self::default()
        }
    }

    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn with_max_size_bytes(mut self, spec: impl Into<SizeSpec>) -> Self {
        self.max_size_bytes = Some(spec.into());
        self
    }

    pub fn with_eviction_config(mut self, settings: EvictionSettings) -> Self {
        self.eviction_config = Some(settings);
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Checks the bounds and resolves them into [`SizeLimits`].
    pub fn validate(&self) -> Result<SizeLimits> {
        let max_items = match self.max_items {
            Some(0) => return Err(CacheError::bounds("maxItems must be positive")),
            Some(n) => Some(n as usize),
            None => None,
        };
        let max_size_bytes = match &self.max_size_bytes {
            Some(spec) => Some(spec.resolve()?),
            None => None,
        };
        Ok(SizeLimits {
            max_items,
            max_size_bytes,
        })
    }
}
