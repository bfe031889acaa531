//! In-memory cache implementation with TTL support

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::config::DEFAULT_MAX_VALUE_SIZE;
use super::error::{CacheError, CacheResult};
use super::key::CacheKey;
use super::provider::{CacheProvider, CacheStats};

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

#[derive(Default)]
struct InMemoryStats {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
}

/// Thread-safe in-memory cache with TTL support
///
/// When `max_entries` is reached, expired entries are purged first; if the
/// cache is still full an arbitrary live entry is evicted. Stats are updated
/// after the store lock is released and may briefly lag concurrent writers.
#[derive(Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
    stats: Arc<RwLock<InMemoryStats>>,
    max_entries: Option<usize>,
    max_value_size: usize,
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("max_entries", &self.max_entries)
            .field("max_value_size", &self.max_value_size)
            .field("default_ttl", &self.default_ttl)
            .field("entry_count", &self.store.read().len())
            .finish_non_exhaustive()
    }
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(InMemoryStats::default())),
            max_entries: None,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            default_ttl: None,
        }
    }

    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    #[must_use]
    pub const fn with_max_value_size(mut self, max: usize) -> Self {
        self.max_value_size = max;
        self
    }

    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let key_str = key.to_key_string();
        let now = Instant::now();
        let store = self.store.read();

        let value = match store.get(&key_str) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                drop(store);
                self.store.write().remove(&key_str);
                None
            }
            None => None,
        };

        let mut stats = self.stats.write();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        if value.len() > self.max_value_size {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_size,
            });
        }

        let key_str = key.to_key_string();
        let now = Instant::now();
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.or(self.default_ttl).and_then(|d| now.checked_add(d)),
        };

        let mut store = self.store.write();
        if let Some(max) = self.max_entries
            && store.len() >= max
            && !store.contains_key(&key_str)
        {
            store.retain(|_, e| !e.is_expired(now));
            if store.len() >= max
                && let Some(victim) = store.keys().next().cloned()
            {
                store.remove(&victim);
            }
        }
        store.insert(key_str, entry);
        drop(store);

        self.stats.write().sets += 1;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.store.write().remove(&key.to_key_string()).is_some();
        if removed {
            self.stats.write().deletes += 1;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &CacheKey) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .store
            .read()
            .get(&key.to_key_string())
            .is_some_and(|e| !e.is_expired(now)))
    }

    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let (size_bytes, entry_count) = {
            let store = self.store.read();
            store
                .values()
                .filter(|e| !e.is_expired(now))
                .fold((0u64, 0u64), |(size, count), e| {
                    (size + e.value.len() as u64, count + 1)
                })
        };
        let stats = self.stats.read();

        CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            deletes: stats.deletes,
            errors: 0,
            size_bytes: Some(size_bytes),
            entry_count: Some(entry_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> CacheKey {
        CacheKey::auth_proxy(id)
    }

    #[tokio::test]
    async fn test_basic_set_get() {
        let cache = InMemoryCache::new();

        cache.set(&key("a"), b"42", None).await.unwrap();
        assert_eq!(cache.get(&key("a")).await.unwrap(), Some(b"42".to_vec()));
        assert!(cache.get(&key("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let cache = InMemoryCache::new();

        cache.set(&key("a"), b"42", None).await.unwrap();
        assert!(cache.delete(&key("a")).await.unwrap());
        assert!(!cache.delete(&key("a")).await.unwrap());
        assert!(cache.get(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exists() {
        let cache = InMemoryCache::new();
        assert!(!cache.exists(&key("a")).await.unwrap());

        cache.set(&key("a"), b"42", None).await.unwrap();
        assert!(cache.exists(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set(&key("a"), b"42", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(cache.get(&key("a")).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&key("a")).await.unwrap().is_none());
        assert!(!cache.exists(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = InMemoryCache::new().with_default_ttl(Duration::MAX);
        cache.set(&key("a"), b"42", None).await.unwrap();
        cache
            .set(&key("b"), b"7", Some(Duration::from_secs(u64::MAX / 2)))
            .await
            .unwrap();

        assert_eq!(cache.get(&key("a")).await.unwrap(), Some(b"42".to_vec()));
        assert_eq!(cache.get(&key("b")).await.unwrap(), Some(b"7".to_vec()));
    }

    #[tokio::test]
    async fn test_explicit_ttl_overrides_default() {
        let cache = InMemoryCache::new().with_default_ttl(Duration::from_millis(10));
        cache
            .set(&key("a"), b"42", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&key("a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_max_entries_eviction() {
        let cache = InMemoryCache::new().with_max_entries(2);

        cache.set(&key("1"), b"1", None).await.unwrap();
        cache.set(&key("2"), b"2", None).await.unwrap();
        cache.set(&key("3"), b"3", None).await.unwrap();

        assert_eq!(cache.stats().await.entry_count, Some(2));
        assert!(cache.get(&key("3")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_prefers_expired_entries() {
        let cache = InMemoryCache::new().with_max_entries(2);

        cache
            .set(&key("short"), b"1", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        cache.set(&key("long"), b"2", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.set(&key("new"), b"3", None).await.unwrap();

        assert!(cache.get(&key("long")).await.unwrap().is_some());
        assert!(cache.get(&key("new")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_value_too_large_rejected() {
        let cache = InMemoryCache::new().with_max_value_size(4);

        match cache.set(&key("a"), b"12345", None).await.unwrap_err() {
            CacheError::ValueTooLarge { size, max } => {
                assert_eq!(size, 5);
                assert_eq!(max, 4);
            }
            e => panic!("Expected ValueTooLarge error, got: {e:?}"),
        }
        assert!(cache.set(&key("a"), b"1234", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_stats_accuracy() {
        let cache = InMemoryCache::new();

        cache.get(&key("a")).await.unwrap();
        cache.set(&key("a"), b"42", None).await.unwrap();
        cache.get(&key("a")).await.unwrap();
        cache.delete(&key("a")).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let cache = InMemoryCache::new();
        let clone = cache.clone();

        cache.set(&key("a"), b"42", None).await.unwrap();
        assert_eq!(clone.get(&key("a")).await.unwrap(), Some(b"42".to_vec()));

        clone.delete(&key("a")).await.unwrap();
        assert_eq!(cache.stats().await.entry_count, Some(0));
    }
}
