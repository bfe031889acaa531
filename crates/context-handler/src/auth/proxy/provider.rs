//! Identity providers consulted by the auth proxy strategy

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::config::{AuthProxyConfig, ProxyAttribute, ProxyHeaderProperty};
use crate::constants::AUTH_PROXY_MODULE;
use crate::store::{IdentityStore, StoreResult};
use crate::types::{ExternalUserInfo, UserId};

/// What the trusted proxy asserted about the caller
#[derive(Debug, Clone, Copy)]
pub struct ProxyRequest<'a> {
    /// Trimmed value of the trust header
    pub header_value: &'a str,
    pub headers: &'a HeaderMap,
}

/// Turns a proxy assertion into a local user id
#[async_trait]
pub trait ProxyIdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this provider does not apply to the request
    async fn resolve(&self, request: ProxyRequest<'_>) -> StoreResult<Option<UserId>>;
}

/// Creates or updates users straight from the proxy headers
pub struct HeaderProxyProvider {
    store: Arc<dyn IdentityStore>,
    config: Arc<AuthProxyConfig>,
}

impl std::fmt::Debug for HeaderProxyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderProxyProvider")
            .field("header_property", &self.config.header_property)
            .field("auto_sign_up", &self.config.auto_sign_up)
            .finish_non_exhaustive()
    }
}

impl HeaderProxyProvider {
    #[must_use]
    pub const fn new(store: Arc<dyn IdentityStore>, config: Arc<AuthProxyConfig>) -> Self {
        Self { store, config }
    }

    /// External user described by the trust header and attribute headers
    pub fn external_user(&self, request: ProxyRequest<'_>) -> ExternalUserInfo {
        let value = request.header_value;
        let mut info = ExternalUserInfo {
            auth_module: AUTH_PROXY_MODULE.to_string(),
            auth_id: value.to_string(),
            login: value.to_string(),
            ..ExternalUserInfo::default()
        };

        match self.config.header_property {
            ProxyHeaderProperty::Username => {
                if looks_like_email(value) {
                    info.email = value.to_string();
                }
            }
            ProxyHeaderProperty::Email => info.email = value.to_string(),
        }

        for (attribute, header) in &self.config.headers {
            let Some(raw) = request
                .headers
                .get(header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            else {
                continue;
            };

            match attribute {
                ProxyAttribute::Name => info.name = raw.to_string(),
                ProxyAttribute::Email => info.email = raw.to_string(),
                ProxyAttribute::Login => info.login = raw.to_string(),
                ProxyAttribute::Role => match raw.parse() {
                    Ok(role) => info.org_role = Some(role),
                    Err(e) => {
                        tracing::debug!(header = %header, error = %e, "Ignoring proxy role header");
                    }
                },
                ProxyAttribute::Groups => {
                    info.groups = raw
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|g| !g.is_empty())
                        .map(str::to_string)
                        .collect();
                }
            }
        }

        info
    }
}

fn looks_like_email(value: &str) -> bool {
    value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

#[async_trait]
impl ProxyIdentityProvider for HeaderProxyProvider {
    fn name(&self) -> &'static str {
        "header"
    }

    async fn resolve(&self, request: ProxyRequest<'_>) -> StoreResult<Option<UserId>> {
        let info = self.external_user(request);
        let user = self
            .store
            .upsert_external_user(&info, self.config.auto_sign_up)
            .await?;
        Ok(Some(user.id))
    }
}
