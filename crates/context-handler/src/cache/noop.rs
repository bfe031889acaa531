//! No-op cache implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;
use super::key::CacheKey;
use super::provider::{CacheProvider, CacheStats};

/// Cache that never stores
///
/// With this backend every proxy login goes to the provider chain.
#[derive(Debug, Clone, Default)]
pub struct NoopCache {
    misses: Arc<AtomicU64>,
}

impl NoopCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheProvider for NoopCache {
    async fn get(&self, _key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &CacheKey) -> CacheResult<bool> {
        Ok(false)
    }

    async fn exists(&self, _key: &CacheKey) -> CacheResult<bool> {
        Ok(false)
    }

    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_never_stores() {
        let cache = NoopCache::new();
        let key = CacheKey::auth_proxy("abc");

        cache
            .set(&key, b"42", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(!cache.exists(&key).await.unwrap());
        assert!(!cache.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_noop_stats_tracks_misses() {
        let cache = NoopCache::new();
        let clone = cache.clone();
        let key = CacheKey::auth_proxy("abc");

        cache.get(&key).await.unwrap();
        clone.get(&key).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }
}
