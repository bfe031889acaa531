//! Traced cache wrapper for observability

use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use super::error::CacheResult;
use super::key::CacheKey;
use super::provider::{CacheProvider, CacheStats};

/// Wrapper that adds tracing to any `CacheProvider`
///
/// Spans are debug level. Keys are header digests and carry no credentials,
/// values are never logged.
pub struct TracedCache<C> {
    inner: C,
    service_name: String,
}

impl<C: std::fmt::Debug> std::fmt::Debug for TracedCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedCache")
            .field("inner", &self.inner)
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl<C: Clone> Clone for TracedCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            service_name: self.service_name.clone(),
        }
    }
}

impl<C> TracedCache<C> {
    pub fn new(cache: C, service_name: impl Into<String>) -> Self {
        Self {
            inner: cache,
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl<C: CacheProvider> CacheProvider for TracedCache<C> {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let span = tracing::debug_span!(
            "cache.get",
            service = %self.service_name,
            cache.namespace = key.namespace().as_str(),
            cache.key = %key,
        );

        let result = self.inner.get(key).instrument(span).await;

        match &result {
            Ok(Some(data)) => {
                tracing::debug!(
                    cache.result = "hit",
                    cache.key = %key,
                    cache.size_bytes = data.len(),
                );
                #[cfg(feature = "metrics")]
                crate::observability::metrics::record_cache_lookup(key.namespace().as_str(), true);
            }
            Ok(None) => {
                tracing::debug!(cache.result = "miss", cache.key = %key);
                #[cfg(feature = "metrics")]
                crate::observability::metrics::record_cache_lookup(key.namespace().as_str(), false);
            }
            Err(e) => {
                tracing::warn!(cache.result = "error", cache.key = %key, error = %e);
            }
        }

        result
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let span = tracing::debug_span!(
            "cache.set",
            service = %self.service_name,
            cache.namespace = key.namespace().as_str(),
            cache.key = %key,
            cache.value_size = value.len(),
            cache.ttl_secs = ttl.map(|d| d.as_secs()),
        );

        let result = self.inner.set(key, value, ttl).instrument(span).await;

        if let Err(ref e) = result {
            tracing::warn!(cache.operation = "set", cache.key = %key, error = %e);
        }

        result
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let span = tracing::debug_span!(
            "cache.delete",
            service = %self.service_name,
            cache.namespace = key.namespace().as_str(),
            cache.key = %key,
        );

        let result = self.inner.delete(key).instrument(span).await;

        match &result {
            Ok(deleted) => {
                tracing::debug!(
                    cache.operation = "delete",
                    cache.key = %key,
                    cache.deleted = deleted
                );
            }
            Err(e) => {
                tracing::warn!(cache.operation = "delete", cache.key = %key, error = %e);
            }
        }

        result
    }

    async fn exists(&self, key: &CacheKey) -> CacheResult<bool> {
        let span = tracing::debug_span!(
            "cache.exists",
            service = %self.service_name,
            cache.key = %key,
        );

        self.inner.exists(key).instrument(span).await
    }

    async fn health_check(&self) -> CacheResult<()> {
        let span = tracing::debug_span!("cache.health_check", service = %self.service_name);

        self.inner.health_check().instrument(span).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}
