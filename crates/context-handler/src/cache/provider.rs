//! Cache provider trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;
use super::key::CacheKey;

/// Cache statistics for metrics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub size_bytes: Option<u64>,
    pub entry_count: Option<u64>,
}

/// Async key/value cache with TTL
///
/// All operations are async to support network-based backends. The pipeline
/// treats stored entries as advisory.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Get a value from cache by key; expired entries are misses
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in cache with optional TTL
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key; `Ok(false)` when there was nothing to delete
    async fn delete(&self, key: &CacheKey) -> CacheResult<bool>;

    async fn exists(&self, key: &CacheKey) -> CacheResult<bool>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> CacheResult<()>;

    /// Get cache statistics for observability
    async fn stats(&self) -> CacheStats;
}
