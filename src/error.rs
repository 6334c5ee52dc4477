//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// A missing or expired key is not an error: lookups report it as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Rejected configuration, only ever returned by the constructor
    #[error("Invalid config: {0}")]
    Config(String),

    /// Rejected call argument; the cache state is left unchanged
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The expiry index consumer has stopped and no longer accepts commands
    #[error("Expiry index unavailable")]
    IndexUnavailable,

    /// The cache was constructed outside of a tokio runtime
    #[error("No tokio runtime available to host the cache background tasks")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
