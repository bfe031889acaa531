//! HTTP server exposing a small API behind the context middleware

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::{Router, middleware};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::guard::{req_editor_role, req_signed_in};
use crate::handler::{ContextHandler, context_middleware};
use crate::types::{OrgId, OrgRole};
use crate::{Error, Result};

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cache: &'static str,
}

#[derive(Debug, Serialize)]
struct OrgResponse {
    id: OrgId,
    name: String,
    role: Option<OrgRole>,
}

/// Application routes wrapped in the context middleware
pub fn router(handler: Arc<ContextHandler>, config: &ServerConfig) -> Router {
    #[allow(unused_mut)]
    let mut app: Router<Arc<ContextHandler>> = Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/user",
            get(user_handler).layer(middleware::from_fn(req_signed_in)),
        )
        .route(
            "/api/org",
            get(org_handler).layer(middleware::from_fn(req_editor_role)),
        );

    #[cfg(feature = "metrics")]
    {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(handler.clone())
        .layer(middleware::from_fn_with_state(handler, context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
}

/// Serve until `shutdown` resolves
pub async fn run_http(
    handler: Arc<ContextHandler>,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    emit_security_warnings(config.host);

    let app = router(handler, config);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("HTTP server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| Error::Transport(format!("HTTP server error: {e}")))?;

    tracing::info!("HTTP server shutdown complete");
    Ok(())
}

fn emit_security_warnings(host: IpAddr) {
    let is_all_interfaces = host == IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        || host == IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED);

    if is_all_interfaces {
        tracing::warn!(
            "HTTP server binding to all interfaces. \
             Restrict the auth proxy whitelist if proxy authentication is enabled."
        );
    } else if !host.is_loopback() {
        tracing::warn!("HTTP server binding to non-loopback address ({host})");
    }
}

async fn health_handler(State(handler): State<Arc<ContextHandler>>) -> impl IntoResponse {
    match handler.cache_health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                cache: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version: env!("CARGO_PKG_VERSION"),
                    cache: "unavailable",
                }),
            )
        }
    }
}

async fn user_handler(Extension(ctx): Extension<RequestContext>) -> Json<RequestContext> {
    Json(ctx)
}

async fn org_handler(Extension(ctx): Extension<RequestContext>) -> Json<OrgResponse> {
    Json(OrgResponse {
        id: ctx.org_id,
        name: ctx.org_name,
        role: ctx.org_role,
    })
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(handler): State<Arc<ContextHandler>>) -> impl IntoResponse {
    crate::observability::metrics::record_cache_stats(&handler.cache_stats().await);
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        crate::observability::render_metrics(),
    )
}
