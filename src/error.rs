use thiserror::Error;

/// Errors surfaced by cache construction and cache operations.
///
/// The variants map one-to-one onto the failure kinds the cache
/// distinguishes:
///
/// * `NotFound` - the remote reported that a single item does not exist.
///   Propagated to the caller; the cache is left unchanged. Collection
///   operations (`all`, `find`) never surface this variant: they cache an
///   empty result instead.
/// * `ValidationFailure` - a key does not match the kind schema of the
///   cache map it was used against. Hard error, cache unchanged.
/// * `BoundsFailure` - the configuration is invalid (zero item limit,
///   unparseable size string, unknown eviction policy name). Raised at
///   construction time.
/// * `Remote` - any non-NotFound failure from the remote API. Propagated;
///   partial cache writes already committed remain in place.
///
/// # Examples
///
/// ```
/// use locus_cache::CacheError;
///
/// let err = CacheError::not_found("task:42");
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote reported a missing item.
    #[error("item not found: {key}")]
    NotFound { key: String },

    /// A key failed validation against the cache map's kind schema.
    #[error("key validation failed: {reason}")]
    ValidationFailure { reason: String },

    /// The configuration is invalid.
    #[error("invalid cache configuration: {0}")]
    BoundsFailure(String),

    /// The remote API failed for a reason other than NotFound.
    #[error("remote operation failed: {0}")]
    Remote(String),
}

impl CacheError {
    /// Builds a `NotFound` error for the given key or fingerprint.
    pub fn not_found(key: impl Into<String>) -> Self {
        CacheError::NotFound { key: key.into() }
    }

    /// Builds a `ValidationFailure` with the given reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        CacheError::ValidationFailure {
            reason: reason.into(),
        }
    }

    /// Builds a `BoundsFailure` with the given message.
    pub fn bounds(message: impl Into<String>) -> Self {
        CacheError::BoundsFailure(message.into())
    }

    /// Builds a `Remote` error with the given message.
    pub fn remote(message: impl Into<String>) -> Self {
        CacheError::Remote(message.into())
    }

    /// Returns true if this error is the distinguished NotFound failure.
    ///
    /// Collection operations use this to decide between caching an empty
    /// result and propagating the error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
