//! Per-request authentication context for axum services
//!
//! [`ContextHandler`] resolves who is calling from render keys, API keys,
//! basic auth, a trusted auth proxy, session cookies or anonymous access, in
//! that order. [`context_middleware`] attaches the resulting
//! [`RequestContext`] to every request and rotates session tokens right
//! before the response is written.

pub mod apikey;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
mod constants;
pub mod context;
mod error;
pub mod finalize;
pub mod guard;
pub mod handler;
mod helpers;
pub mod observability;
pub mod store;
pub mod transport;
pub mod types;

pub use auth::{AuthFailure, AuthStrategy, Outcome, RequestScope};
pub use cache::{
    CacheBackend, CacheConfig, CacheError, CacheKey, CacheNamespace, CacheProvider, CacheResult,
    CacheStats, InMemoryCache, NoopCache, TracedCache, create_cache,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AnonymousConfig, AuthProxyConfig, Config, ConfigBuilder, SameSite, ServerConfig,
    SessionConfig, TelemetryConfig,
};
pub use context::{Identity, RequestContext};
pub use error::{Error, Result};
pub use finalize::{FinalizeHook, FinalizeHooks, ResponseWritten};
pub use guard::{Denied, Requirement, authorize};
pub use handler::{ContextHandler, ContextHandlerBuilder, Dispatch, context_middleware};
pub use store::{IdentityStore, InMemoryIdentityStore, StoreError, StoreResult};
pub use types::*;
