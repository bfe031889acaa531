//! API key strategy

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AuthFailure;
use super::header::{authorization, bearer_token, decode_basic_auth};
use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::apikey;
use crate::clock::SharedClock;
use crate::constants::{
    API_KEY_BASIC_USERNAME, ERR_EXPIRED_API_KEY, ERR_INVALID_API_KEY, ERR_VALIDATING_API_KEY,
};
use crate::store::IdentityStore;

/// Authenticates `Authorization: Bearer <key>` or basic auth as `api_key:<key>`
pub struct ApiKeyStrategy {
    store: Arc<dyn IdentityStore>,
    clock: SharedClock,
}

impl std::fmt::Debug for ApiKeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyStrategy").finish_non_exhaustive()
    }
}

impl ApiKeyStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }
}

/// Key material carried by the `Authorization` header, if any
fn key_from_header(value: &str) -> Option<String> {
    if let Some(token) = bearer_token(value) {
        return Some(token.to_string());
    }

    decode_basic_auth(value)
        .filter(|(username, _)| username == API_KEY_BASIC_USERNAME)
        .map(|(_, password)| password)
        .filter(|password| !password.is_empty())
}

#[async_trait]
impl AuthStrategy for ApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        let Some(client_key) = authorization(scope.headers()).and_then(key_from_header) else {
            return Outcome::NotHandled;
        };

        let decoded = match apikey::decode(&client_key) {
            Ok(decoded) => decoded,
            Err(e) => {
                return Outcome::Rejected(AuthFailure::unauthorized_with(ERR_INVALID_API_KEY, e));
            }
        };

        let key = match self.store.lookup_api_key(&decoded.name, decoded.org_id).await {
            Ok(key) => key,
            Err(e) if e.is_not_found() => {
                return Outcome::Rejected(AuthFailure::unauthorized_with(ERR_INVALID_API_KEY, e));
            }
            Err(e) => {
                return Outcome::Rejected(AuthFailure::internal(ERR_VALIDATING_API_KEY, e));
            }
        };

        if !apikey::is_valid(&decoded, &key.hashed_key) {
            tracing::debug!(strategy = self.name(), key_id = key.id, "API key secret mismatch");
            return Outcome::Rejected(AuthFailure::unauthorized(ERR_INVALID_API_KEY));
        }

        if let Some(expires_at) = key.expires_at
            && expires_at <= self.clock.now()
        {
            tracing::debug!(
                strategy = self.name(),
                key_id = key.id,
                %expires_at,
                "API key expired"
            );
            return Outcome::Rejected(AuthFailure::unauthorized(ERR_EXPIRED_API_KEY));
        }

        tracing::debug!(
            strategy = self.name(),
            key_id = key.id,
            org_id = key.org_id,
            "API key accepted"
        );
        scope.context_mut().sign_in_api_key(&key);
        Outcome::Handled
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::Duration;

    use super::*;
    use crate::auth::strategy::test_support::{FailingStore, Failures, Fixture, fixture, parts};
    use crate::clock::Clock;
    use crate::context::Identity;
    use crate::finalize::FinalizeHooks;
    use crate::types::OrgRole;

    fn strategy(fx: &Fixture) -> ApiKeyStrategy {
        ApiKeyStrategy::new(fx.store.clone(), fx.clock.clone())
    }

    async fn run(fx: &Fixture, authorization: &str) -> (Outcome, crate::context::RequestContext) {
        let parts = parts(&[("authorization", authorization)]);
        let mut scope = RequestScope::new(&parts, 0, FinalizeHooks::new());
        let outcome = strategy(fx).try_handle(&mut scope).await;
        (outcome, scope.finish().0)
    }

    #[tokio::test]
    async fn test_valid_bearer_key() {
        let fx = fixture();
        let (key, secret) = fx
            .store
            .add_api_key(fx.org.id, "ci", OrgRole::Editor, None)
            .unwrap();

        let (outcome, ctx) = run(&fx, &format!("Bearer {secret}")).await;
        assert_eq!(outcome, Outcome::Handled);
        assert!(ctx.is_signed_in);
        assert_eq!(ctx.org_id, fx.org.id);
        assert_eq!(ctx.org_role, Some(OrgRole::Editor));
        assert_eq!(
            ctx.identity,
            Some(Identity::ApiKey {
                key_id: key.id,
                name: "ci".into()
            })
        );
    }

    #[tokio::test]
    async fn test_valid_basic_encoded_key() {
        let fx = fixture();
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "ci", OrgRole::Viewer, None)
            .unwrap();
        let header = format!("Basic {}", STANDARD.encode(format!("api_key:{secret}")));

        let (outcome, ctx) = run(&fx, &header).await;
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(ctx.org_role, Some(OrgRole::Viewer));
    }

    #[tokio::test]
    async fn test_other_basic_user_not_handled() {
        let fx = fixture();
        let header = format!("Basic {}", STANDARD.encode("alice:s3cret"));
        let (outcome, _) = run(&fx, &header).await;
        assert_eq!(outcome, Outcome::NotHandled);
    }

    #[tokio::test]
    async fn test_undecodable_key_rejected() {
        let fx = fixture();
        let (outcome, ctx) = run(&fx, "Bearer not-a-key").await;
        assert!(matches!(
            outcome,
            Outcome::Rejected(AuthFailure::Unauthorized {
                message: ERR_INVALID_API_KEY,
                ..
            })
        ));
        assert!(!ctx.is_signed_in);
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let fx = fixture();
        let generated = apikey::generate(fx.org.id, "ghost");
        let (outcome, _) = run(&fx, &format!("Bearer {}", generated.client_secret)).await;
        assert!(matches!(outcome, Outcome::Rejected(AuthFailure::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let fx = fixture();
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "ci", OrgRole::Admin, None)
            .unwrap();
        let mut decoded = apikey::decode(&secret).unwrap();
        decoded.secret = "forged".into();

        let (outcome, _) = run(&fx, &format!("Bearer {}", apikey::encode(&decoded))).await;
        assert_eq!(
            outcome,
            Outcome::Rejected(AuthFailure::unauthorized(ERR_INVALID_API_KEY))
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let fx = fixture();
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "ci", OrgRole::Editor, None)
            .unwrap();
        let failures = Failures {
            lookup_api_key: true,
            ..Failures::default()
        };
        let strategy =
            ApiKeyStrategy::new(FailingStore::new(fx.store.clone(), failures), fx.clock.clone());

        let authorization = format!("Bearer {secret}");
        let parts = parts(&[("authorization", &authorization)]);
        let mut scope = RequestScope::new(&parts, 0, FinalizeHooks::new());
        let Outcome::Rejected(failure) = strategy.try_handle(&mut scope).await else {
            panic!("backend error must reject the request");
        };
        assert_eq!(failure.status().as_u16(), 500);
        assert_eq!(failure.message(), ERR_VALIDATING_API_KEY);
        assert!(!scope.finish().0.is_signed_in);
    }

    #[tokio::test]
    async fn test_expired_key_rejected() {
        let fx = fixture();
        let expires = fx.clock.now() - Duration::seconds(1);
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "old", OrgRole::Admin, Some(expires))
            .unwrap();

        let (outcome, ctx) = run(&fx, &format!("Bearer {secret}")).await;
        assert_eq!(
            outcome,
            Outcome::Rejected(AuthFailure::unauthorized(ERR_EXPIRED_API_KEY))
        );
        assert!(!ctx.is_signed_in);
    }

    #[tokio::test]
    async fn test_key_expiring_now_rejected() {
        let fx = fixture();
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "edge", OrgRole::Viewer, Some(fx.clock.now()))
            .unwrap();

        let (outcome, _) = run(&fx, &format!("Bearer {secret}")).await;
        assert_eq!(
            outcome,
            Outcome::Rejected(AuthFailure::unauthorized(ERR_EXPIRED_API_KEY))
        );
    }

    #[tokio::test]
    async fn test_future_expiry_accepted() {
        let fx = fixture();
        let expires = fx.clock.now() + Duration::days(1);
        let (_, secret) = fx
            .store
            .add_api_key(fx.org.id, "fresh", OrgRole::Viewer, Some(expires))
            .unwrap();

        let (outcome, _) = run(&fx, &format!("Bearer {secret}")).await;
        assert_eq!(outcome, Outcome::Handled);
    }

    #[test]
    fn test_key_from_header() {
        assert_eq!(key_from_header("Bearer abc"), Some("abc".into()));
        let basic = format!("Basic {}", STANDARD.encode("api_key:xyz"));
        assert_eq!(key_from_header(&basic), Some("xyz".into()));
        let empty = format!("Basic {}", STANDARD.encode("api_key:"));
        assert_eq!(key_from_header(&empty), None);
        assert_eq!(key_from_header("Digest abc"), None);
    }
}
