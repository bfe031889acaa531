//! Cache key types

use std::fmt;

/// Cache key namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// User ids resolved by the auth proxy strategy
    AuthProxy,
}

impl CacheNamespace {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthProxy => "auth-proxy-sync-ttl",
        }
    }
}

/// Structured cache key with namespace isolation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    identifier: String,
}

impl CacheKey {
    /// Key for a proxy identity; `digest` is the hash of the proxy headers
    #[must_use]
    pub fn auth_proxy(digest: &str) -> Self {
        Self {
            namespace: CacheNamespace::AuthProxy,
            identifier: digest.to_string(),
        }
    }

    #[must_use]
    pub const fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Convert to string key for storage
    #[must_use]
    pub fn to_key_string(&self) -> String {
        format!("{}:{}", self.namespace.as_str(), self.identifier)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key_string())
    }
}
