//! Remote cache abstraction
//!
//! The auth proxy strategy memoizes resolved user ids here, keyed by a digest
//! of the proxy headers. Backends share one async interface.
//!
//! # Available Backends
//!
//! - [`NoopCache`] - never stores; every proxy login hits the providers
//! - [`InMemoryCache`] - thread-safe in-memory cache with TTL support
//!
//! Wrap any cache with [`TracedCache`] to add tracing spans and logging.

mod config;
mod error;
mod key;
mod memory;
mod noop;
mod provider;
mod traced;

use std::sync::Arc;

pub use config::{CacheBackend, CacheConfig, DEFAULT_MAX_VALUE_SIZE};
pub use error::{CacheError, CacheResult};
pub use key::{CacheKey, CacheNamespace};
pub use memory::InMemoryCache;
pub use noop::NoopCache;
pub use provider::{CacheProvider, CacheStats};
pub use traced::TracedCache;

/// Create a cache provider based on configuration
#[must_use]
pub fn create_cache(config: &CacheConfig, service_name: &str) -> Arc<dyn CacheProvider> {
    if !config.enabled {
        return Arc::new(NoopCache::new());
    }

    match config.backend {
        CacheBackend::Noop => Arc::new(NoopCache::new()),
        CacheBackend::Memory => {
            let mut cache = InMemoryCache::new()
                .with_default_ttl(config.default_ttl)
                .with_max_value_size(config.max_value_size);

            if let Some(max) = config.max_entries {
                cache = cache.with_max_entries(max);
            }

            Arc::new(TracedCache::new(cache, service_name))
        }
    }
}
