//! Error types for the cloxcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. a shard or slot count that is not a positive power of two).
//! - [`InvariantError`]: Returned when internal data-structure invariants are
//!   violated (debug/test-only `check_invariants` methods).
//!
//! ## Example Usage
//!
//! ```
//! use cloxcache::cache::{CloxCache, Config};
//! use cloxcache::error::ConfigError;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache: Result<CloxCache<String>, ConfigError> = CloxCache::new(Config {
//!     num_shards: 16,
//!     slots_per_shard: 256,
//!     ..Config::default()
//! });
//! assert!(cache.is_ok());
//!
//! // An invalid shard count is caught without panicking
//! let bad = CloxCache::<String>::new(Config {
//!     num_shards: 15,
//!     ..Config::default()
//! });
//! assert!(bad.unwrap_err().to_string().contains("num_shards"));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CloxCache::new`](crate::cache::CloxCache::new) and
/// [`CacheBuilder::try_build`](crate::builder::CacheBuilder::try_build).
/// Carries a human-readable description naming the parameter that failed
/// validation.
///
/// # Example
///
/// ```
/// use cloxcache::cache::{CloxCache, Config};
///
/// let err = CloxCache::<u64>::new(Config {
///     slots_per_shard: 0,
///     ..Config::default()
/// })
/// .unwrap_err();
/// assert!(err.to_string().contains("slots_per_shard"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by the debug/test-only
/// [`CloxCache::check_invariants`](crate::cache::CloxCache::check_invariants)
/// walker. Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
