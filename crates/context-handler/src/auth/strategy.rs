//! Strategy contract and the per-request scope strategies operate on

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, header};

use super::error::AuthFailure;
use super::header::cookie_value;
use crate::context::RequestContext;
use crate::finalize::FinalizeHooks;
use crate::types::OrgId;

/// Result of offering a request to one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Credential form not recognized, or a silent fallthrough
    NotHandled,
    /// Identity resolved into the request context
    Handled,
    /// Credential recognized but rejected; ends the chain with this response
    Rejected(AuthFailure),
}

impl Outcome {
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        !matches!(self, Self::NotHandled)
    }
}

/// One way of establishing who is making a request
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome;
}

/// Request view and mutable state handed to each strategy in turn
#[derive(Debug)]
pub struct RequestScope<'a> {
    parts: &'a Parts,
    org_id: OrgId,
    context: RequestContext,
    finalizers: FinalizeHooks,
    cookies: Vec<HeaderValue>,
}

impl<'a> RequestScope<'a> {
    #[must_use]
    pub fn new(parts: &'a Parts, org_id: OrgId, finalizers: FinalizeHooks) -> Self {
        Self {
            parts,
            org_id,
            context: RequestContext::new(),
            finalizers,
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub const fn parts(&self) -> &'a Parts {
        self.parts
    }

    #[must_use]
    pub const fn headers(&self) -> &'a HeaderMap {
        &self.parts.headers
    }

    /// Header value as text; missing, empty or non-ASCII values are `None`
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        cookie_value(&self.parts.headers, name)
    }

    /// Organization requested by the client, `0` for the user's default
    #[must_use]
    pub const fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Address of the connected peer, when the server exposes it
    #[must_use]
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical())
    }

    #[must_use]
    pub fn user_agent(&self) -> &'a str {
        self.parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    pub const fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    #[must_use]
    pub const fn finalizers(&self) -> &FinalizeHooks {
        &self.finalizers
    }

    /// Queue a `Set-Cookie` value for whatever response ends up being sent
    pub fn queue_cookie(&mut self, cookie: HeaderValue) {
        self.cookies.push(cookie);
    }

    /// Finish the scope, yielding the resolved context and queued cookies
    #[must_use]
    pub fn finish(self) -> (RequestContext, Vec<HeaderValue>) {
        (self.context, self.cookies)
    }
}
