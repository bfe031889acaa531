//! Strategy dispatcher and the axum context middleware
//!
//! [`ContextHandler::dispatch`] runs the strategies in order and stops at the
//! first one that claims the request. [`context_middleware`] wraps it for
//! axum: it attaches the resulting [`RequestContext`] to the request, answers
//! rejections directly, and runs finalize hooks before the response leaves.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::header::org_id_from_headers;
use crate::auth::{
    AnonymousStrategy, ApiKeyStrategy, AuthFailure, AuthProxyStrategy, AuthStrategy,
    BasicAuthStrategy, Outcome, ProxyIdentityProvider, RenderKeyStrategy, RequestScope,
    SessionStrategy,
};
use crate::cache::{CacheProvider, CacheResult, CacheStats, create_cache};
use crate::clock::{SharedClock, system_clock};
use crate::config::Config;
use crate::context::RequestContext;
use crate::finalize::FinalizeHooks;
use crate::observability::outcome_label;
use crate::store::{IdentityStore, InMemoryRenderKeys, RenderService};

const DEFAULT_RENDER_KEY_TTL: TimeDelta = TimeDelta::minutes(5);

/// Result of running the strategy chain for one request
#[derive(Debug)]
pub struct Dispatch {
    pub context: RequestContext,
    /// Cookies queued by strategies, appended to whatever response is sent
    pub cookies: Vec<HeaderValue>,
    /// Set when a strategy rejected the request
    pub failure: Option<AuthFailure>,
    /// Name of the strategy that handled or rejected the request
    pub handled_by: Option<&'static str>,
    /// Pending last-seen update, if one was dispatched
    pub touch: Option<JoinHandle<()>>,
}

/// Ordered authentication strategies plus the last-seen bookkeeping
pub struct ContextHandler {
    strategies: Vec<Arc<dyn AuthStrategy>>,
    store: Arc<dyn IdentityStore>,
    cache: Arc<dyn CacheProvider>,
    clock: SharedClock,
    org_id_header: String,
    last_seen_threshold: TimeDelta,
}

impl std::fmt::Debug for ContextHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandler")
            .field("strategies", &self.strategy_names())
            .field("org_id_header", &self.org_id_header)
            .field("last_seen_threshold", &self.last_seen_threshold)
            .finish_non_exhaustive()
    }
}

impl ContextHandler {
    #[must_use]
    pub fn builder(config: Config, store: Arc<dyn IdentityStore>) -> ContextHandlerBuilder {
        ContextHandlerBuilder::new(config, store)
    }

    /// Strategy names in evaluation order
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Reachability of the proxy cache
    pub async fn cache_health(&self) -> CacheResult<()> {
        self.cache.health_check().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Run the strategy chain against `parts`
    ///
    /// Stops at the first strategy that handles or rejects the request.
    /// Whatever the outcome, a stale last-seen timestamp triggers a
    /// background update.
    pub async fn dispatch(&self, parts: &Parts, finalizers: FinalizeHooks) -> Dispatch {
        let org_id = org_id_from_headers(&parts.headers, &self.org_id_header);
        let mut scope = RequestScope::new(parts, org_id, finalizers);
        let mut handled_by = None;
        let mut failure = None;

        for strategy in &self.strategies {
            let outcome = strategy.try_handle(&mut scope).await;
            let label = outcome_label(&outcome);
            tracing::trace!(strategy = strategy.name(), outcome = label, "Strategy evaluated");
            #[cfg(feature = "metrics")]
            crate::observability::metrics::record_strategy_outcome(strategy.name(), label);

            match outcome {
                Outcome::NotHandled => continue,
                Outcome::Handled => {}
                Outcome::Rejected(rejection) => failure = Some(rejection),
            }
            handled_by = Some(strategy.name());
            break;
        }

        let (context, cookies) = scope.finish();
        tracing::debug!(
            strategy = handled_by.unwrap_or("none"),
            user_id = context.user_id(),
            org_id = context.org_id,
            signed_in = context.is_signed_in,
            rejected = failure.is_some(),
            "Request context resolved"
        );

        let touch = self.touch_last_seen(&context);
        Dispatch {
            context,
            cookies,
            failure,
            handled_by,
            touch,
        }
    }

    /// Spawn a last-seen update when the context's timestamp is stale
    ///
    /// Failures are logged and never reach the caller.
    fn touch_last_seen(&self, context: &RequestContext) -> Option<JoinHandle<()>> {
        if !context.should_update_last_seen_at(self.clock.now(), self.last_seen_threshold) {
            return None;
        }

        let store = self.store.clone();
        let user_id = context.user_id();
        Some(tokio::spawn(async move {
            let result = store.update_last_seen_at(user_id).await;
            if let Err(e) = &result {
                tracing::error!(user_id, error = %e, "Failed to update last_seen_at");
            }
            #[cfg(feature = "metrics")]
            crate::observability::metrics::record_last_seen_update(result.is_ok());
        }))
    }
}

/// Assembles a [`ContextHandler`] from configuration and collaborators
pub struct ContextHandlerBuilder {
    config: Config,
    store: Arc<dyn IdentityStore>,
    cache: Option<Arc<dyn CacheProvider>>,
    renderer: Option<Arc<dyn RenderService>>,
    clock: Option<SharedClock>,
    proxy_providers: Option<Vec<Arc<dyn ProxyIdentityProvider>>>,
}

impl std::fmt::Debug for ContextHandlerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandlerBuilder")
            .field("config", &self.config)
            .field("has_cache", &self.cache.is_some())
            .field("has_renderer", &self.renderer.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ContextHandlerBuilder {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            config,
            store,
            cache: None,
            renderer: None,
            clock: None,
            proxy_providers: None,
        }
    }

    /// Cache for proxy logins; defaults to one built from the cache config
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Render-key resolver; defaults to an empty in-memory registry
    #[must_use]
    pub fn render_service(mut self, renderer: Arc<dyn RenderService>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Identity providers for the auth proxy, tried in order
    #[must_use]
    pub fn proxy_providers(mut self, providers: Vec<Arc<dyn ProxyIdentityProvider>>) -> Self {
        self.proxy_providers = Some(providers);
        self
    }

    #[must_use]
    pub fn build(self) -> ContextHandler {
        let config = self.config;
        let store = self.store;
        let clock = self.clock.unwrap_or_else(system_clock);
        let cache = self
            .cache
            .unwrap_or_else(|| create_cache(&config.cache, &config.telemetry.service_name));
        let renderer = self.renderer.unwrap_or_else(|| {
            Arc::new(InMemoryRenderKeys::new(clock.clone(), DEFAULT_RENDER_KEY_TTL))
        });

        let mut proxy = AuthProxyStrategy::new(store.clone(), cache.clone(), config.auth_proxy);
        if let Some(providers) = self.proxy_providers {
            proxy = proxy.with_providers(providers);
        }

        let strategies: Vec<Arc<dyn AuthStrategy>> = vec![
            Arc::new(RenderKeyStrategy::new(renderer, clock.clone())),
            Arc::new(ApiKeyStrategy::new(store.clone(), clock.clone())),
            Arc::new(BasicAuthStrategy::new(store.clone(), config.basic_auth_enabled)),
            Arc::new(proxy),
            Arc::new(SessionStrategy::new(store.clone(), config.session)),
            Arc::new(AnonymousStrategy::new(store.clone(), config.anonymous)),
        ];

        let last_seen_threshold =
            TimeDelta::from_std(config.last_seen_threshold).unwrap_or(TimeDelta::MAX);

        ContextHandler {
            strategies,
            store,
            cache,
            clock,
            org_id_header: config.org_id_header,
            last_seen_threshold,
        }
    }
}

/// Resolve the request context before handing the request on
///
/// Rejections are answered here and never reach the inner service. On the
/// way out, queued cookies are appended and finalize hooks run unless the
/// client went away first.
#[allow(clippy::future_not_send)]
pub async fn context_middleware(
    State(handler): State<Arc<ContextHandler>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let finalizers = FinalizeHooks::new();
    let dispatch = handler.dispatch(&parts, finalizers.clone()).await;

    let mut response = match dispatch.failure {
        Some(failure) => {
            tracing::debug!(
                strategy = dispatch.handled_by.unwrap_or("none"),
                status = failure.status().as_u16(),
                "Request rejected"
            );
            failure.into_response()
        }
        None => {
            let cancel = CancellationToken::new();
            let guard = cancel.clone().drop_guard();

            parts.extensions.insert(dispatch.context);
            parts.extensions.insert(finalizers.clone());
            parts.extensions.insert(cancel.clone());

            let mut response = next.run(Request::from_parts(parts, body)).await;
            finalizers.run(&mut response, &cancel).await;
            let _ = guard.disarm();
            response
        }
    };

    let headers = response.headers_mut();
    for cookie in dispatch.cookies {
        headers.append(header::SET_COOKIE, cookie);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::test_support::{FailingStore, Failures, Fixture, PASSWORD, fixture, parts};
    use crate::clock::Clock;
    use crate::context::Identity;
    use crate::store::{InMemoryIdentityStore, NewUser};
    use crate::types::{OrgRole, RenderUser};

    fn handler(fx: &Fixture, config: Config) -> ContextHandler {
        ContextHandler::builder(config, fx.store.clone())
            .clock(fx.clock.clone())
            .build()
    }

    fn basic(login: &str, password: &str) -> String {
        use base64::Engine as _;
        let credentials = format!("{login}:{password}");
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(credentials))
    }

    #[test]
    fn test_strategy_order() {
        let fx = fixture();
        let handler = handler(&fx, Config::default());
        assert_eq!(
            handler.strategy_names(),
            vec!["render_key", "api_key", "basic", "auth_proxy", "session", "anonymous"]
        );
    }

    #[tokio::test]
    async fn test_api_key_wins_over_session() {
        let fx = fixture();
        let (key, secret) = fx
            .store
            .add_api_key(fx.org.id, "ci", OrgRole::Admin, None)
            .unwrap();
        let token = fx.store.create_token(fx.user.id, None, "test").unwrap();
        let handler = handler(&fx, Config::default());

        let authorization = format!("Bearer {secret}");
        let cookie = format!("grafana_session={}", token.unhashed_token);
        let request = parts(&[("authorization", &authorization), ("cookie", &cookie)]);
        let finalizers = FinalizeHooks::new();
        let dispatch = handler.dispatch(&request, finalizers.clone()).await;

        assert_eq!(dispatch.handled_by, Some("api_key"));
        assert!(dispatch.failure.is_none());
        assert_eq!(
            dispatch.context.identity,
            Some(Identity::ApiKey {
                key_id: key.id,
                name: "ci".into()
            })
        );
        assert_eq!(dispatch.context.org_role, Some(OrgRole::Admin));
        assert!(finalizers.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_stops_the_chain() {
        let fx = fixture();
        let token = fx.store.create_token(fx.user.id, None, "test").unwrap();
        let config = Config::builder().anonymous_enabled(true).build().unwrap();
        let handler = handler(&fx, config);

        let authorization = basic("alice", "wrong");
        let cookie = format!("grafana_session={}", token.unhashed_token);
        let request = parts(&[("authorization", &authorization), ("cookie", &cookie)]);
        let dispatch = handler.dispatch(&request, FinalizeHooks::new()).await;

        assert_eq!(dispatch.handled_by, Some("basic"));
        assert_eq!(dispatch.failure.map(|f| f.status().as_u16()), Some(401));
        assert!(!dispatch.context.is_signed_in);
        assert!(!dispatch.context.allow_anonymous);
    }

    #[tokio::test]
    async fn test_no_credentials_and_no_anonymous() {
        let fx = fixture();
        let handler = handler(&fx, Config::default());
        let dispatch = handler.dispatch(&parts(&[]), FinalizeHooks::new()).await;

        assert!(dispatch.handled_by.is_none());
        assert!(dispatch.failure.is_none());
        assert!(!dispatch.context.is_signed_in);
        assert!(!dispatch.context.allow_anonymous);
        assert!(dispatch.context.identity.is_none());
        assert!(dispatch.touch.is_none());
    }

    #[tokio::test]
    async fn test_invalid_session_falls_through_to_anonymous() {
        let fx = fixture();
        let config = Config::builder().anonymous_enabled(true).build().unwrap();
        let handler = handler(&fx, config);

        let request = parts(&[("cookie", "grafana_session=stale")]);
        let dispatch = handler.dispatch(&request, FinalizeHooks::new()).await;

        assert_eq!(dispatch.handled_by, Some("anonymous"));
        assert!(dispatch.context.allow_anonymous);
        assert_eq!(dispatch.cookies.len(), 1);
    }

    #[tokio::test]
    async fn test_requested_org_header_scopes_basic_login() {
        let fx = fixture();
        let other = fx.store.create_org("Second").unwrap();
        fx.store
            .add_org_user(other.id, fx.user.id, OrgRole::Admin)
            .unwrap();
        let handler = handler(&fx, Config::default());

        let authorization = basic("alice", PASSWORD);
        let org = other.id.to_string();
        let request = parts(&[("authorization", &authorization), ("x-grafana-org-id", &org)]);
        let dispatch = handler.dispatch(&request, FinalizeHooks::new()).await;

        assert_eq!(dispatch.context.org_id, other.id);
        assert_eq!(dispatch.context.org_role, Some(OrgRole::Admin));
    }

    #[tokio::test]
    async fn test_stale_last_seen_is_touched() {
        let fx = fixture();
        let handler = handler(&fx, Config::default());
        let authorization = basic("alice", PASSWORD);

        let dispatch = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        dispatch.touch.expect("never seen user is touched").await.unwrap();
        assert_eq!(fx.store.last_seen_at(fx.user.id), Some(fx.clock.now()));

        let dispatch = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        assert!(dispatch.touch.is_none());

        fx.clock.advance(TimeDelta::minutes(6));
        let dispatch = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        assert!(dispatch.touch.is_some());
    }

    #[tokio::test]
    async fn test_failed_touch_does_not_affect_request() {
        let fx = fixture();
        let failures = Failures {
            update_last_seen_at: true,
            ..Failures::default()
        };
        let store = FailingStore::new(fx.store.clone(), failures);
        let handler = ContextHandler::builder(Config::default(), store)
            .clock(fx.clock.clone())
            .build();
        let authorization = basic("alice", PASSWORD);

        let dispatch = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        assert_eq!(dispatch.handled_by, Some("basic"));
        assert!(dispatch.failure.is_none());
        assert!(dispatch.context.is_signed_in);

        dispatch.touch.expect("stale user is touched").await.unwrap();
        assert!(fx.store.last_seen_at(fx.user.id).is_none());
    }

    #[tokio::test]
    async fn test_oversized_session_lifetime_keeps_sessions_valid() {
        let config = Config::builder()
            .login_max_lifetime(Duration::from_secs(u64::MAX / 2))
            .login_max_inactive_lifetime(Duration::from_secs(u64::MAX / 2))
            .build()
            .unwrap();
        let fx = fixture();
        let store = Arc::new(
            InMemoryIdentityStore::new(fx.clock.clone())
                .with_token_settings(config.session.token_settings()),
        );
        let org = store.create_org("Main Org.").unwrap();
        let user = store
            .create_user(
                NewUser {
                    login: "dave".into(),
                    ..NewUser::default()
                },
                org.id,
                OrgRole::Viewer,
            )
            .unwrap();
        let token = store.create_token(user.id, None, "test").unwrap();
        let handler = ContextHandler::builder(config, store.clone())
            .clock(fx.clock.clone())
            .build();

        fx.clock.advance(TimeDelta::days(400));
        let cookie = format!("grafana_session={}", token.unhashed_token);
        let dispatch = handler
            .dispatch(&parts(&[("cookie", &cookie)]), FinalizeHooks::new())
            .await;
        assert_eq!(dispatch.handled_by, Some("session"));
        assert!(dispatch.context.is_signed_in);
    }

    #[tokio::test]
    async fn test_cache_health_and_stats_exposed() {
        use crate::cache::{CacheKey, InMemoryCache};

        let fx = fixture();
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set(&CacheKey::auth_proxy("abc"), b"7", None)
            .await
            .unwrap();
        let handler = ContextHandler::builder(Config::default(), fx.store.clone())
            .clock(fx.clock.clone())
            .cache(cache)
            .build();

        assert!(handler.cache_health().await.is_ok());
        assert_eq!(handler.cache_stats().await.entry_count, Some(1));
    }

    #[tokio::test]
    async fn test_custom_threshold_respected() {
        let fx = fixture();
        let config = Config::builder()
            .last_seen_threshold(Duration::from_secs(3600))
            .build()
            .unwrap();
        let handler = handler(&fx, config);
        let authorization = basic("alice", PASSWORD);

        let first = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        first.touch.unwrap().await.unwrap();

        fx.clock.advance(TimeDelta::minutes(30));
        let second = handler
            .dispatch(&parts(&[("authorization", &authorization)]), FinalizeHooks::new())
            .await;
        assert!(second.touch.is_none());
    }

    #[tokio::test]
    async fn test_render_key_checked_first() {
        let fx = fixture();
        let renderer = Arc::new(InMemoryRenderKeys::new(fx.clock.clone(), TimeDelta::minutes(5)));
        let key = renderer.issue(RenderUser {
            org_id: fx.org.id,
            user_id: fx.user.id,
            org_role: OrgRole::Viewer,
        });
        let handler = ContextHandler::builder(Config::default(), fx.store.clone())
            .clock(fx.clock.clone())
            .render_service(renderer)
            .build();

        let cookie = format!("renderKey={key}");
        let authorization = basic("alice", PASSWORD);
        let request = parts(&[("cookie", &cookie), ("authorization", &authorization)]);
        let dispatch = handler.dispatch(&request, FinalizeHooks::new()).await;

        assert_eq!(dispatch.handled_by, Some("render_key"));
        assert!(dispatch.context.is_render_call);
        assert!(dispatch.touch.is_none());
    }

    #[tokio::test]
    async fn test_deleted_user_session_falls_through() {
        let fx = fixture();
        let bob = fx
            .store
            .create_user(
                NewUser {
                    login: "bob".into(),
                    password: Some("pw".into()),
                    ..NewUser::default()
                },
                fx.org.id,
                OrgRole::Viewer,
            )
            .unwrap();
        let token = fx.store.create_token(bob.id, None, "test").unwrap();
        fx.store.delete_user(bob.id).unwrap();
        let handler = handler(&fx, Config::default());

        let cookie = format!("grafana_session={}", token.unhashed_token);
        let dispatch = handler
            .dispatch(&parts(&[("cookie", &cookie)]), FinalizeHooks::new())
            .await;
        assert!(dispatch.handled_by.is_none());
        assert!(!dispatch.context.is_signed_in);
    }
}
