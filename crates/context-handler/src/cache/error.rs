//! Remote cache error types

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Value too large: {size} bytes (max: {max} bytes)")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether retrying the same call later could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
