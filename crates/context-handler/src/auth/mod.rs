//! Authentication strategies
//!
//! Each strategy inspects one kind of credential. The dispatcher in
//! [`crate::handler`] runs them in a fixed order and stops at the first one
//! that handles or rejects the request:
//!
//! 1. [`RenderKeyStrategy`] - `renderKey` cookie issued to the image renderer
//! 2. [`ApiKeyStrategy`] - bearer token or basic auth as `api_key`
//! 3. [`BasicAuthStrategy`] - username and password
//! 4. [`AuthProxyStrategy`] - user asserted by a trusted reverse proxy
//! 5. [`SessionStrategy`] - login cookie, with deferred token rotation
//! 6. [`AnonymousStrategy`] - configured anonymous organization

mod anonymous;
mod api_key;
mod basic;
mod cookie;
mod error;
pub mod header;
mod proxy;
mod render;
mod session;
mod strategy;

pub use anonymous::AnonymousStrategy;
pub use api_key::ApiKeyStrategy;
pub use basic::BasicAuthStrategy;
pub use cookie::{clear_session_cookie, session_cookie};
pub use error::AuthFailure;
pub use proxy::{
    AuthProxyStrategy, HeaderProxyProvider, IpNetwork, ProxyIdentityProvider, ProxyRequest,
    is_allowed, parse_allow_list, proxy_cache_key,
};
pub use render::RenderKeyStrategy;
pub use session::{SessionRotationHook, SessionStrategy};
pub use strategy::{AuthStrategy, Outcome, RequestScope};

#[cfg(test)]
pub(crate) use strategy::test_support;
