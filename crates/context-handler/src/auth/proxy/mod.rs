//! Auth proxy strategy
//!
//! A trusted reverse proxy asserts the user in a header. Resolved user ids
//! are cached under a digest of the proxy headers, so deleting a user leaves
//! its cache entries behind; a failed user lookup therefore evicts the entry
//! and logs in once more without the cache.

mod allowlist;
mod provider;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

pub use allowlist::{IpNetwork, is_allowed, parse_allow_list};
pub use provider::{HeaderProxyProvider, ProxyIdentityProvider, ProxyRequest};

use super::error::AuthFailure;
use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::cache::{CacheKey, CacheProvider};
use crate::config::AuthProxyConfig;
use crate::constants::{
    ERR_PROXY_AUTH_REQUIRED, ERR_PROXY_CACHE_STORE, ERR_PROXY_LOGIN_FAILED, ERR_PROXY_USER_LOOKUP,
};
use crate::helpers::sha256_hex;
use crate::store::IdentityStore;
use crate::types::UserId;

/// Cache key for a proxy assertion
///
/// Digest of the trimmed trust header value followed by every non-empty
/// configured attribute header, in attribute order.
pub fn proxy_cache_key(
    header_value: &str,
    headers: &HeaderMap,
    config: &AuthProxyConfig,
) -> CacheKey {
    let mut parts = vec![header_value.trim()];
    parts.extend(config.headers.values().filter_map(|header| {
        headers
            .get(header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }));
    CacheKey::auth_proxy(&sha256_hex(&parts))
}

/// Signs in the user asserted by a trusted proxy header
pub struct AuthProxyStrategy {
    store: Arc<dyn IdentityStore>,
    cache: Arc<dyn CacheProvider>,
    config: Arc<AuthProxyConfig>,
    providers: Vec<Arc<dyn ProxyIdentityProvider>>,
}

impl std::fmt::Debug for AuthProxyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers: Vec<&'static str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("AuthProxyStrategy")
            .field("config", &self.config)
            .field("providers", &providers)
            .finish_non_exhaustive()
    }
}

impl AuthProxyStrategy {
    /// Strategy backed by the header provider alone
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: Arc<dyn CacheProvider>,
        config: AuthProxyConfig,
    ) -> Self {
        let config = Arc::new(config);
        let header: Arc<dyn ProxyIdentityProvider> =
            Arc::new(HeaderProxyProvider::new(store.clone(), config.clone()));
        Self {
            store,
            cache,
            config,
            providers: vec![header],
        }
    }

    /// Replace the provider chain; providers are tried in order
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ProxyIdentityProvider>>) -> Self {
        self.providers = providers;
        self
    }

    async fn login(
        &self,
        request: ProxyRequest<'_>,
        key: &CacheKey,
        ignore_cache: bool,
    ) -> Result<UserId, AuthFailure> {
        tracing::debug!(strategy = self.name(), ignore_cache, "Trying to log user in");

        if !ignore_cache && let Some(user_id) = self.cached_user_id(key).await {
            return Ok(user_id);
        }

        for provider in &self.providers {
            match provider.resolve(request).await {
                Ok(Some(user_id)) => {
                    self.write_cache(key, user_id).await;
                    return Ok(user_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        strategy = self.name(),
                        provider = provider.name(),
                        ignore_cache,
                        error = %e,
                        "Failed to login"
                    );
                    return Err(AuthFailure::proxy_rejected(ERR_PROXY_LOGIN_FAILED, e.to_string()));
                }
            }
        }

        Err(AuthFailure::proxy_rejected(
            ERR_PROXY_LOGIN_FAILED,
            "no identity provider accepted the proxy header",
        ))
    }

    async fn cached_user_id(&self, key: &CacheKey) -> Option<UserId> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<UserId>(&bytes) {
                Ok(user_id) if user_id > 0 => Some(user_id),
                _ => {
                    tracing::debug!(cache.key = %key, "Ignoring undecodable proxy cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache.key = %key, error = %e, "Proxy cache lookup failed");
                None
            }
        }
    }

    async fn write_cache(&self, key: &CacheKey, user_id: UserId) {
        let ttl = Some(self.config.sync_ttl);
        if let Err(e) = self.cache.set(key, user_id.to_string().as_bytes(), ttl).await {
            tracing::warn!(cache.key = %key, error = %e, "Failed to cache proxy user");
        }
    }

    async fn evict(&self, key: &CacheKey) {
        match self.cache.delete(key).await {
            Ok(_) => {
                #[cfg(feature = "metrics")]
                crate::observability::metrics::record_cache_eviction(key.namespace().as_str());
            }
            Err(e) => {
                tracing::error!(
                    cache.key = %key,
                    error = %e,
                    "Got unexpected error when removing user from auth cache"
                );
            }
        }
    }

    /// Store the user id unless an entry already exists, keeping its expiry
    async fn remember(&self, key: &CacheKey, user_id: UserId) -> Result<(), AuthFailure> {
        match self.cache.exists(key).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => tracing::warn!(cache.key = %key, error = %e, "Proxy cache lookup failed"),
        }

        self.cache
            .set(key, user_id.to_string().as_bytes(), Some(self.config.sync_ttl))
            .await
            .map_err(|e| AuthFailure::internal(ERR_PROXY_CACHE_STORE, e))
    }
}

#[async_trait]
impl AuthStrategy for AuthProxyStrategy {
    fn name(&self) -> &'static str {
        "auth_proxy"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        if !self.config.enabled {
            return Outcome::NotHandled;
        }
        let Some(header_value) = scope
            .header(&self.config.header_name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Outcome::NotHandled;
        };

        if !self.config.whitelist.is_empty() {
            let peer = scope.remote_addr();
            if !peer.is_some_and(|ip| is_allowed(&self.config.whitelist, ip)) {
                let from = peer.map_or_else(|| "an unknown address".into(), |ip| ip.to_string());
                tracing::error!(
                    strategy = self.name(),
                    peer = %from,
                    "Failed to check whitelisted IP addresses"
                );
                let detail = format!(
                    "Request for user ({header_value}) from {from} \
                     is not from the authentication proxy"
                );
                return Outcome::Rejected(AuthFailure::proxy_rejected(
                    ERR_PROXY_AUTH_REQUIRED,
                    detail,
                ));
            }
        }

        let request = ProxyRequest {
            header_value,
            headers: scope.headers(),
        };
        let key = proxy_cache_key(header_value, request.headers, &self.config);
        let org_id = scope.org_id();

        let user_id = match self.login(request, &key, false).await {
            Ok(user_id) => user_id,
            Err(failure) => return Outcome::Rejected(failure),
        };
        tracing::debug!(strategy = self.name(), user_id, "Got user ID, getting full user info");

        let user = match self.store.get_signed_in_user(user_id, org_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::debug!(
                    strategy = self.name(),
                    user_id,
                    error = %e,
                    "Failed to get user info given ID, retrying without cache"
                );
                self.evict(&key).await;

                let user_id = match self.login(request, &key, true).await {
                    Ok(user_id) => user_id,
                    Err(failure) => return Outcome::Rejected(failure),
                };
                match self.store.get_signed_in_user(user_id, org_id).await {
                    Ok(user) => user,
                    Err(e) => {
                        return Outcome::Rejected(AuthFailure::proxy_rejected(
                            ERR_PROXY_USER_LOOKUP,
                            e.to_string(),
                        ));
                    }
                }
            }
        };

        tracing::debug!(
            strategy = self.name(),
            user_id = user.user_id,
            login = %user.login,
            "Successfully got user info"
        );
        let user_id = user.user_id;
        scope.context_mut().sign_in_user(user);

        match self.remember(&key, user_id).await {
            Ok(()) => Outcome::Handled,
            Err(failure) => Outcome::Rejected(failure),
        }
    }
}
