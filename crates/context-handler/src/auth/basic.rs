//! Username and password strategy

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AuthFailure;
use super::header::{authorization, decode_basic_auth};
use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::constants::{ERR_INVALID_BASIC_HEADER, ERR_INVALID_USERNAME_PASSWORD};
use crate::store::{IdentityStore, StoreError};

/// Authenticates `Authorization: Basic` credentials against the identity store
pub struct BasicAuthStrategy {
    store: Arc<dyn IdentityStore>,
    enabled: bool,
}

impl std::fmt::Debug for BasicAuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthStrategy")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl BasicAuthStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }
}

#[async_trait]
impl AuthStrategy for BasicAuthStrategy {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        if !self.enabled {
            return Outcome::NotHandled;
        }
        let Some(header) = authorization(scope.headers()) else {
            return Outcome::NotHandled;
        };

        let Some((username, password)) = decode_basic_auth(header) else {
            return Outcome::Rejected(AuthFailure::unauthorized(ERR_INVALID_BASIC_HEADER));
        };

        let user = match self.store.login(&username, &password).await {
            Ok(user) => user,
            Err(e) => {
                // Unknown users look exactly like wrong passwords to the client
                let e = match e {
                    StoreError::UserNotFound => StoreError::InvalidCredentials,
                    other => other,
                };
                tracing::debug!(strategy = self.name(), error = %e, "Failed to authorize the user");
                return Outcome::Rejected(AuthFailure::unauthorized_with(
                    ERR_INVALID_USERNAME_PASSWORD,
                    e,
                ));
            }
        };

        match self.store.get_signed_in_user(user.id, scope.org_id()).await {
            Ok(signed_in) => {
                tracing::debug!(
                    strategy = self.name(),
                    user_id = signed_in.user_id,
                    org_id = signed_in.org_id,
                    "Basic auth accepted"
                );
                scope.context_mut().sign_in_user(signed_in);
                Outcome::Handled
            }
            Err(e) => {
                tracing::error!(
                    strategy = self.name(),
                    user_id = user.id,
                    org_id = scope.org_id(),
                    error = %e,
                    "Failed at user signed in"
                );
                Outcome::Rejected(AuthFailure::unauthorized_with(ERR_INVALID_USERNAME_PASSWORD, e))
            }
        }
    }
}
