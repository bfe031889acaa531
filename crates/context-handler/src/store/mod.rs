//! Identity store and render-key abstractions
//!
//! The pipeline only reads identities and asks for token rotation; the store
//! owns persistence and its own synchronization. [`InMemoryIdentityStore`]
//! is a complete implementation used by tests and the bundled server.

mod memory;
mod render;

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::{InMemoryIdentityStore, NewUser, TokenSettings};
pub use render::{InMemoryRenderKeys, RenderService};

use crate::types::{
    ApiKey, ExternalUserInfo, Org, OrgId, RotateOutcome, SignedInUser, User, UserId, UserToken,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("user not found")]
    UserNotFound,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user token expired")]
    TokenExpired,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the error means "no such record" rather than a malfunction
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::UserNotFound)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Async identity store consumed by the strategies
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find an API key by name inside an organization
    async fn lookup_api_key(&self, name: &str, org_id: OrgId) -> StoreResult<ApiKey>;

    /// Check username (or email) and password
    async fn login(&self, username: &str, password: &str) -> StoreResult<User>;

    /// Resolve a user scoped to `org_id` (`0` selects the user's current org)
    async fn get_signed_in_user(&self, user_id: UserId, org_id: OrgId)
    -> StoreResult<SignedInUser>;

    /// Find a live session token by its unhashed value
    async fn lookup_token(&self, unhashed_token: &str) -> StoreResult<UserToken>;

    /// Rotate `token` unless a concurrent request already did so recently
    async fn try_rotate_token(
        &self,
        token: &UserToken,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> StoreResult<RotateOutcome>;

    async fn get_org_by_name(&self, name: &str) -> StoreResult<Org>;

    async fn update_last_seen_at(&self, user_id: UserId) -> StoreResult<()>;

    /// Create or update a user asserted by an external system
    async fn upsert_external_user(
        &self,
        info: &ExternalUserInfo,
        auto_sign_up: bool,
    ) -> StoreResult<User>;
}
