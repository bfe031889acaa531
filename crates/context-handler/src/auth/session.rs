//! Session cookie strategy and deferred token rotation

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};

use super::cookie::{clear_session_cookie, session_cookie};
use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::config::SessionConfig;
use crate::finalize::FinalizeHook;
use crate::store::IdentityStore;
use crate::types::UserToken;

/// Resolves the user behind the login cookie and schedules token rotation
pub struct SessionStrategy {
    store: Arc<dyn IdentityStore>,
    session: Arc<SessionConfig>,
}

impl std::fmt::Debug for SessionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStrategy")
            .field("cookie", &self.session.login_cookie_name)
            .finish_non_exhaustive()
    }
}

impl SessionStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, session: SessionConfig) -> Self {
        Self {
            store,
            session: Arc::new(session),
        }
    }
}

#[async_trait]
impl AuthStrategy for SessionStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        if self.session.login_cookie_name.is_empty() {
            return Outcome::NotHandled;
        }
        let Some(raw_token) = scope.cookie(&self.session.login_cookie_name) else {
            return Outcome::NotHandled;
        };

        let token = match self.store.lookup_token(&raw_token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(
                    strategy = self.name(),
                    error = %e,
                    "Failed to look up user based on cookie"
                );
                if let Some(cookie) = clear_session_cookie(&self.session) {
                    scope.queue_cookie(cookie);
                }
                return Outcome::NotHandled;
            }
        };

        let user = match self.store.get_signed_in_user(token.user_id, scope.org_id()).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(
                    strategy = self.name(),
                    user_id = token.user_id,
                    error = %e,
                    "Failed to get user with id"
                );
                return Outcome::NotHandled;
            }
        };

        let hook = SessionRotationHook {
            store: self.store.clone(),
            session: self.session.clone(),
            token: token.clone(),
            client_ip: scope.remote_addr(),
            user_agent: scope.user_agent().to_string(),
        };
        scope.finalizers().register(hook);

        let ctx = scope.context_mut();
        ctx.sign_in_user(user);
        ctx.user_token = Some(token);
        Outcome::Handled
    }
}

/// Rotates the session token once the response is about to be written
///
/// A new cookie is written only when the store reports a rotation.
pub struct SessionRotationHook {
    store: Arc<dyn IdentityStore>,
    session: Arc<SessionConfig>,
    token: UserToken,
    client_ip: Option<IpAddr>,
    user_agent: String,
}

impl std::fmt::Debug for SessionRotationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRotationHook")
            .field("token", &self.token)
            .field("client_ip", &self.client_ip)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FinalizeHook for SessionRotationHook {
    fn name(&self) -> &'static str {
        "session_rotation"
    }

    async fn before_write(self: Box<Self>, headers: &mut HeaderMap) {
        let outcome = match self
            .store
            .try_rotate_token(&self.token, self.client_ip, &self.user_agent)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(token_id = self.token.id, error = %e, "Failed to rotate token");
                #[cfg(feature = "metrics")]
                crate::observability::metrics::record_token_rotation("failed");
                return;
            }
        };

        if !outcome.rotated {
            #[cfg(feature = "metrics")]
            crate::observability::metrics::record_token_rotation("skipped");
            return;
        }

        tracing::debug!(
            token_id = outcome.token.id,
            user_id = outcome.token.user_id,
            "Session token rotated"
        );
        #[cfg(feature = "metrics")]
        crate::observability::metrics::record_token_rotation("rotated");

        if let Some(cookie) = session_cookie(
            &self.session,
            &outcome.token.unhashed_token,
            self.session.login_max_lifetime,
        ) {
            headers.append(header::SET_COOKIE, cookie);
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::response::Response;
    use chrono::Duration;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::auth::strategy::test_support::{FailingStore, Failures, Fixture, fixture, parts};
    use crate::context::RequestContext;
    use crate::finalize::FinalizeHooks;

    struct Run {
        outcome: Outcome,
        context: RequestContext,
        cookies: Vec<axum::http::HeaderValue>,
        hooks: FinalizeHooks,
    }

    async fn run(fx: &Fixture, cookie: &str, org_id: i64) -> Run {
        let strategy = SessionStrategy::new(fx.store.clone(), SessionConfig::default());
        let hooks = FinalizeHooks::new();
        let parts = parts(&[("cookie", cookie), ("user-agent", "test-agent")]);
        let mut scope = RequestScope::new(&parts, org_id, hooks.clone());
        let outcome = strategy.try_handle(&mut scope).await;
        let (context, cookies) = scope.finish();
        Run {
            outcome,
            context,
            cookies,
            hooks,
        }
    }

    async fn finalize(hooks: &FinalizeHooks) -> Response {
        let mut response = Response::new(Body::empty());
        hooks.run(&mut response, &CancellationToken::new()).await;
        response
    }

    #[tokio::test]
    async fn test_valid_session_signs_in() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let run = run(&fx, &format!("grafana_session={}", token.unhashed_token), 0).await;

        assert_eq!(run.outcome, Outcome::Handled);
        assert!(run.context.is_signed_in);
        assert_eq!(run.context.user_id(), fx.user.id);
        assert_eq!(run.context.user_token.as_ref().map(|t| t.id), Some(token.id));
        assert_eq!(run.hooks.len(), 1);
        assert!(run.cookies.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cookie_is_cleared() {
        let fx = fixture();
        let run = run(&fx, "grafana_session=bogus", 0).await;

        assert_eq!(run.outcome, Outcome::NotHandled);
        assert!(!run.context.is_signed_in);
        assert!(run.hooks.is_empty());
        assert_eq!(run.cookies.len(), 1);
        assert!(
            run.cookies[0]
                .to_str()
                .unwrap()
                .starts_with("grafana_session=; Path=/; Max-Age=0")
        );
    }

    #[tokio::test]
    async fn test_user_lookup_failure_falls_through_silently() {
        let fx = fixture();
        let other = fx.store.create_org("Other").unwrap();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let run = run(&fx, &format!("grafana_session={}", token.unhashed_token), other.id).await;

        assert_eq!(run.outcome, Outcome::NotHandled);
        assert!(run.cookies.is_empty());
        assert!(run.hooks.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_token_not_rotated() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let run = run(&fx, &format!("grafana_session={}", token.unhashed_token), 0).await;

        let response = finalize(&run.hooks).await;
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_stale_token_rotated_with_new_cookie() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let cookie = format!("grafana_session={}", token.unhashed_token);

        // First request marks the token as seen
        let first = run(&fx, &cookie, 0).await;
        finalize(&first.hooks).await;

        fx.clock.advance(Duration::minutes(11));
        let second = run(&fx, &cookie, 0).await;
        assert_eq!(second.outcome, Outcome::Handled);

        let response = finalize(&second.hooks).await;
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        let set_cookie = set_cookie.to_str().unwrap();
        assert!(set_cookie.starts_with("grafana_session="));
        assert!(!set_cookie.contains(&token.unhashed_token));
        assert!(set_cookie.contains(&format!("Max-Age={}", 30 * 24 * 60 * 60)));
    }

    #[tokio::test]
    async fn test_rotation_failure_writes_no_cookie() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let cookie = format!("grafana_session={}", token.unhashed_token);
        run(&fx, &cookie, 0).await;
        fx.clock.advance(Duration::minutes(11));

        let failures = Failures {
            try_rotate_token: true,
            ..Failures::default()
        };
        let strategy = SessionStrategy::new(
            FailingStore::new(fx.store.clone(), failures),
            SessionConfig::default(),
        );
        let hooks = FinalizeHooks::new();
        let parts = parts(&[("cookie", &cookie)]);
        let mut scope = RequestScope::new(&parts, 0, hooks.clone());
        assert_eq!(strategy.try_handle(&mut scope).await, Outcome::Handled);
        assert_eq!(hooks.len(), 1);

        let response = finalize(&hooks).await;
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        // the token stays usable after the failed rotation
        let again = run(&fx, &cookie, 0).await;
        assert_eq!(again.outcome, Outcome::Handled);
    }

    #[tokio::test]
    async fn test_rotation_skipped_when_cancelled() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test-agent").unwrap();
        let cookie = format!("grafana_session={}", token.unhashed_token);
        run(&fx, &cookie, 0).await;

        fx.clock.advance(Duration::minutes(11));
        let second = run(&fx, &cookie, 0).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut response = Response::new(Body::empty());

        assert_eq!(second.hooks.run(&mut response, &cancel).await, 0);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
