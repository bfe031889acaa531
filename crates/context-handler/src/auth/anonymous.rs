//! Anonymous access fallback

use std::sync::Arc;

use async_trait::async_trait;

use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::config::AnonymousConfig;
use crate::store::IdentityStore;

/// Grants the configured role in the configured org to unauthenticated requests
pub struct AnonymousStrategy {
    store: Arc<dyn IdentityStore>,
    config: AnonymousConfig,
}

impl std::fmt::Debug for AnonymousStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymousStrategy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnonymousStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, config: AnonymousConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl AuthStrategy for AnonymousStrategy {
    fn name(&self) -> &'static str {
        "anonymous"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        if !self.config.enabled {
            return Outcome::NotHandled;
        }

        match self.store.get_org_by_name(&self.config.org_name).await {
            Ok(org) => {
                scope
                    .context_mut()
                    .allow_anonymous_in(org.id, &org.name, self.config.org_role);
                Outcome::Handled
            }
            Err(e) => {
                tracing::error!(
                    strategy = self.name(),
                    org = %self.config.org_name,
                    error = %e,
                    "Anonymous access enabled but could not find org"
                );
                Outcome::NotHandled
            }
        }
    }
}
