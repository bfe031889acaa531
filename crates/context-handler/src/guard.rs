//! Authorization guards for routes behind the context middleware

use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::constants::{ERR_FORBIDDEN, ERR_UNAUTHORIZED};
use crate::context::RequestContext;
use crate::types::OrgRole;

/// What a route demands of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Signed in, or anonymous access granted
    SignedIn,
    GrafanaAdmin,
    /// At least this role in the current org
    Role(OrgRole),
}

/// Why a guard turned the request away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    Unauthenticated,
    Forbidden,
}

impl Denied {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => ERR_UNAUTHORIZED,
            Self::Forbidden => ERR_FORBIDDEN,
        }
    }
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "message": self.message() }))).into_response()
    }
}

/// Check `requirement` against the resolved context
///
/// A missing context means the middleware never ran, which is treated as
/// unauthenticated.
pub fn authorize(context: Option<&RequestContext>, requirement: Requirement) -> Result<(), Denied> {
    let Some(ctx) = context else {
        return Err(Denied::Unauthenticated);
    };

    match requirement {
        Requirement::SignedIn if ctx.is_signed_in || ctx.allow_anonymous => Ok(()),
        Requirement::SignedIn => Err(Denied::Unauthenticated),
        Requirement::GrafanaAdmin if !ctx.is_signed_in => Err(Denied::Unauthenticated),
        Requirement::GrafanaAdmin if ctx.is_grafana_admin() => Ok(()),
        Requirement::GrafanaAdmin => Err(Denied::Forbidden),
        Requirement::Role(role) if ctx.has_role(role) => Ok(()),
        Requirement::Role(_) if ctx.identity.is_none() => Err(Denied::Unauthenticated),
        Requirement::Role(_) => Err(Denied::Forbidden),
    }
}

async fn guard(requirement: Requirement, request: Request, next: Next) -> Response {
    match authorize(request.extensions().get::<RequestContext>(), requirement) {
        Ok(()) => next.run(request).await,
        Err(denied) => {
            tracing::debug!(
                ?requirement,
                status = denied.status().as_u16(),
                path = %request.uri().path(),
                "Request denied"
            );
            denied.into_response()
        }
    }
}

pub async fn req_signed_in(request: Request, next: Next) -> Response {
    guard(Requirement::SignedIn, request, next).await
}

pub async fn req_grafana_admin(request: Request, next: Next) -> Response {
    guard(Requirement::GrafanaAdmin, request, next).await
}

/// Editor or admin in the current org
pub async fn req_editor_role(request: Request, next: Next) -> Response {
    guard(Requirement::Role(OrgRole::Editor), request, next).await
}

pub async fn req_org_admin(request: Request, next: Next) -> Response {
    guard(Requirement::Role(OrgRole::Admin), request, next).await
}
