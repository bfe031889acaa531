//! Request-scoped identity

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{ApiKey, OrgId, OrgRole, RenderUser, SignedInUser, UserId, UserToken};

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    ApiKey { key_id: i64, name: String },
    User(SignedInUser),
    Render { user_id: UserId },
}

/// Identity and organization scope attached to one request
///
/// Created empty by the dispatcher and filled in by whichever strategy
/// handles the request. Handlers read it from the request extensions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    pub is_signed_in: bool,
    pub allow_anonymous: bool,
    pub is_render_call: bool,
    pub org_id: OrgId,
    pub org_name: String,
    pub org_role: Option<OrgRole>,
    #[serde(skip)]
    pub user_token: Option<UserToken>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// User id of the principal, `0` when the request is not tied to a user
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match &self.identity {
            Some(Identity::User(user)) => user.user_id,
            Some(Identity::Render { user_id }) => *user_id,
            _ => 0,
        }
    }

    #[must_use]
    pub fn login(&self) -> &str {
        match &self.identity {
            Some(Identity::User(user)) => &user.login,
            _ => "",
        }
    }

    #[must_use]
    pub const fn signed_in_user(&self) -> Option<&SignedInUser> {
        match &self.identity {
            Some(Identity::User(user)) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self.identity, Some(Identity::Anonymous))
    }

    #[must_use]
    pub const fn is_grafana_admin(&self) -> bool {
        match &self.identity {
            Some(Identity::User(user)) => user.is_grafana_admin,
            _ => false,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: OrgRole) -> bool {
        self.org_role.is_some_and(|r| r.includes(role))
    }

    /// Whether the last-seen timestamp is older than `threshold`
    #[must_use]
    pub fn should_update_last_seen_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.user_id() <= 0 {
            return false;
        }
        self.last_seen_at.is_none_or(|seen| now - seen > threshold)
    }

    pub(crate) fn sign_in_user(&mut self, user: SignedInUser) {
        self.is_signed_in = true;
        self.org_id = user.org_id;
        self.org_name.clone_from(&user.org_name);
        self.org_role = Some(user.org_role);
        self.last_seen_at = user.last_seen_at;
        self.identity = Some(Identity::User(user));
    }

    pub(crate) fn sign_in_api_key(&mut self, key: &ApiKey) {
        self.is_signed_in = true;
        self.org_id = key.org_id;
        self.org_role = Some(key.role);
        self.identity = Some(Identity::ApiKey {
            key_id: key.id,
            name: key.name.clone(),
        });
    }

    pub(crate) fn sign_in_renderer(&mut self, user: &RenderUser, now: DateTime<Utc>) {
        self.is_signed_in = true;
        self.is_render_call = true;
        self.org_id = user.org_id;
        self.org_role = Some(user.org_role);
        self.last_seen_at = Some(now);
        self.identity = Some(Identity::Render {
            user_id: user.user_id,
        });
    }

    pub(crate) fn allow_anonymous_in(&mut self, org_id: OrgId, org_name: &str, role: OrgRole) {
        self.is_signed_in = false;
        self.allow_anonymous = true;
        self.org_id = org_id;
        org_name.clone_into(&mut self.org_name);
        self.org_role = Some(role);
        self.identity = Some(Identity::Anonymous);
    }
}
