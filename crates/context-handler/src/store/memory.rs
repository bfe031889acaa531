//! In-memory identity store with atomic token rotation

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::{IdentityStore, StoreError, StoreResult};
use crate::apikey;
use crate::clock::SharedClock;
use crate::helpers::{constant_time_eq, random_token, sha256_hex};
use crate::types::{
    ApiKey, ExternalUserInfo, Org, OrgId, OrgRole, RotateOutcome, SignedInUser, User, UserId,
    UserToken,
};

const TOKEN_LENGTH: usize = 32;
const SALT_LENGTH: usize = 10;

/// Tokens never seen by a client are rotated after this long
const URGENT_ROTATE_AFTER: Duration = Duration::minutes(1);

/// A rotation newer than this is not repeated by overlapping requests
const ROTATION_GRACE: Duration = Duration::seconds(30);

/// Session token lifetimes
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    /// Hard limit measured from token creation
    pub max_lifetime: Duration,
    /// Limit measured from the last rotation
    pub max_inactive_lifetime: Duration,
    pub rotation_interval: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            max_lifetime: Duration::days(30),
            max_inactive_lifetime: Duration::days(7),
            rotation_interval: Duration::minutes(10),
        }
    }
}

/// Parameters for [`InMemoryIdentityStore::create_user`]
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub name: String,
    pub password: Option<String>,
    pub is_admin: bool,
}

struct StoredUser {
    user: User,
    salt: String,
    password_hash: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    external_auth: Option<(String, String)>,
    external_groups: Vec<String>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    orgs: HashMap<OrgId, Org>,
    users: HashMap<UserId, StoredUser>,
    memberships: HashMap<(OrgId, UserId), OrgRole>,
    api_keys: HashMap<(OrgId, String), ApiKey>,
    tokens: HashMap<i64, UserToken>,
}

impl State {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_user_by_login(&self, login_or_email: &str) -> Option<UserId> {
        let needle = login_or_email.to_lowercase();
        self.users
            .values()
            .find(|u| {
                u.user.login.to_lowercase() == needle || u.user.email.to_lowercase() == needle
            })
            .map(|u| u.user.id)
    }

    fn lowest_org_id(&self) -> Option<OrgId> {
        self.orgs.keys().min().copied()
    }

    fn insert_user(&mut self, new: NewUser, org_id: OrgId, role: OrgRole) -> StoreResult<User> {
        if !self.orgs.contains_key(&org_id) {
            return Err(StoreError::NotFound(format!("org {org_id}")));
        }
        if self.find_user_by_login(&new.login).is_some()
            || (!new.email.is_empty() && self.find_user_by_login(&new.email).is_some())
        {
            return Err(StoreError::Conflict(format!("user {} already exists", new.login)));
        }

        let id = self.next_id();
        let salt = random_token(SALT_LENGTH);
        let password_hash = new.password.as_deref().map(|p| hash_password(&salt, p));
        let user = User {
            id,
            login: new.login,
            email: new.email,
            name: new.name,
            org_id,
            is_admin: new.is_admin,
        };

        self.users.insert(
            id,
            StoredUser {
                user: user.clone(),
                salt,
                password_hash,
                last_seen_at: None,
                external_auth: None,
                external_groups: Vec::new(),
            },
        );
        self.memberships.insert((org_id, id), role);
        Ok(user)
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    sha256_hex(&[salt, password])
}

fn hash_token(unhashed: &str) -> String {
    sha256_hex(&[unhashed])
}

/// Identity store kept in process memory
///
/// All mutations happen under a single write lock, which makes
/// [`IdentityStore::try_rotate_token`] a compare-and-swap: of several
/// requests racing to rotate the same token only the first one wins.
#[derive(Clone)]
pub struct InMemoryIdentityStore {
    state: Arc<RwLock<State>>,
    clock: SharedClock,
    settings: TokenSettings,
}

impl std::fmt::Debug for InMemoryIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryIdentityStore")
            .field("orgs", &state.orgs.len())
            .field("users", &state.users.len())
            .field("tokens", &state.tokens.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InMemoryIdentityStore {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            clock,
            settings: TokenSettings::default(),
        }
    }

    #[must_use]
    pub fn with_token_settings(mut self, settings: TokenSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn token_settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn create_org(&self, name: &str) -> StoreResult<Org> {
        let mut state = self.state.write();
        if state.orgs.values().any(|o| o.name == name) {
            return Err(StoreError::Conflict(format!("org {name} already exists")));
        }
        let org = Org {
            id: state.next_id(),
            name: name.to_string(),
        };
        state.orgs.insert(org.id, org.clone());
        Ok(org)
    }

    /// Create a user whose current org is `org_id`
    pub fn create_user(&self, new: NewUser, org_id: OrgId, role: OrgRole) -> StoreResult<User> {
        self.state.write().insert_user(new, org_id, role)
    }

    pub fn add_org_user(&self, org_id: OrgId, user_id: UserId, role: OrgRole) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.orgs.contains_key(&org_id) {
            return Err(StoreError::NotFound(format!("org {org_id}")));
        }
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound);
        }
        state.memberships.insert((org_id, user_id), role);
        Ok(())
    }

    /// Remove a user together with memberships and sessions
    pub fn delete_user(&self, user_id: UserId) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.users.remove(&user_id).is_none() {
            return Err(StoreError::UserNotFound);
        }
        state.memberships.retain(|(_, uid), _| *uid != user_id);
        state.tokens.retain(|_, t| t.user_id != user_id);
        Ok(())
    }

    /// Issue an API key; the returned string is the only copy of the secret
    pub fn add_api_key(
        &self,
        org_id: OrgId,
        name: &str,
        role: OrgRole,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<(ApiKey, String)> {
        let mut state = self.state.write();
        if !state.orgs.contains_key(&org_id) {
            return Err(StoreError::NotFound(format!("org {org_id}")));
        }
        if state.api_keys.contains_key(&(org_id, name.to_string())) {
            return Err(StoreError::Conflict(format!("api key {name} already exists")));
        }

        let generated = apikey::generate(org_id, name);
        let key = ApiKey {
            id: state.next_id(),
            org_id,
            name: name.to_string(),
            hashed_key: generated.hashed_key,
            role,
            expires_at,
        };
        state
            .api_keys
            .insert((org_id, name.to_string()), key.clone());
        Ok((key, generated.client_secret))
    }

    /// Start a session; the returned token carries the unhashed value
    pub fn create_token(
        &self,
        user_id: UserId,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> StoreResult<UserToken> {
        let now = self.clock.now();
        let mut state = self.state.write();
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound);
        }

        let unhashed = random_token(TOKEN_LENGTH);
        let hashed = hash_token(&unhashed);
        let token = UserToken {
            id: state.next_id(),
            user_id,
            auth_token: hashed.clone(),
            prev_auth_token: hashed,
            user_agent: user_agent.to_string(),
            client_ip,
            auth_token_seen: false,
            seen_at: None,
            rotated_at: now,
            created_at: now,
            unhashed_token: String::new(),
        };
        state.tokens.insert(token.id, token.clone());

        Ok(UserToken {
            unhashed_token: unhashed,
            ..token
        })
    }

    pub fn revoke_token(&self, token_id: i64) -> StoreResult<()> {
        self.state
            .write()
            .tokens
            .remove(&token_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("user token".into()))
    }

    /// Groups last asserted for the user by an external system
    #[must_use]
    pub fn external_groups(&self, user_id: UserId) -> Vec<String> {
        self.state
            .read()
            .users
            .get(&user_id)
            .map(|u| u.external_groups.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_seen_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .users
            .get(&user_id)
            .and_then(|u| u.last_seen_at)
    }

    fn needs_rotation(&self, token: &UserToken, now: DateTime<Utc>) -> bool {
        let interval = if token.auth_token_seen {
            self.settings.rotation_interval
        } else {
            URGENT_ROTATE_AFTER
        };
        cutoff(now, interval).is_some_and(|c| token.rotated_at < c)
    }
}

/// `now - age`, or `None` when the configured age reaches past the
/// representable range and so never elapses
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(age)
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn lookup_api_key(&self, name: &str, org_id: OrgId) -> StoreResult<ApiKey> {
        self.state
            .read()
            .api_keys
            .get(&(org_id, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound("api key".into()))
    }

    async fn login(&self, username: &str, password: &str) -> StoreResult<User> {
        let state = self.state.read();
        let user_id = state
            .find_user_by_login(username)
            .ok_or(StoreError::UserNotFound)?;
        let stored = state.users.get(&user_id).ok_or(StoreError::UserNotFound)?;

        let Some(expected) = stored.password_hash.as_deref() else {
            return Err(StoreError::InvalidCredentials);
        };
        if constant_time_eq(&hash_password(&stored.salt, password), expected) {
            Ok(stored.user.clone())
        } else {
            Err(StoreError::InvalidCredentials)
        }
    }

    async fn get_signed_in_user(
        &self,
        user_id: UserId,
        org_id: OrgId,
    ) -> StoreResult<SignedInUser> {
        let state = self.state.read();
        let stored = state.users.get(&user_id).ok_or(StoreError::UserNotFound)?;
        let org_id = if org_id == 0 {
            stored.user.org_id
        } else {
            org_id
        };

        let role = state
            .memberships
            .get(&(org_id, user_id))
            .copied()
            .ok_or_else(|| {
                StoreError::NotFound(format!("membership of user {user_id} in org {org_id}"))
            })?;
        let org = state
            .orgs
            .get(&org_id)
            .ok_or_else(|| StoreError::NotFound(format!("org {org_id}")))?;

        Ok(SignedInUser {
            user_id,
            org_id,
            org_name: org.name.clone(),
            org_role: role,
            login: stored.user.login.clone(),
            name: stored.user.name.clone(),
            email: stored.user.email.clone(),
            is_grafana_admin: stored.user.is_admin,
            last_seen_at: stored.last_seen_at,
        })
    }

    async fn lookup_token(&self, unhashed_token: &str) -> StoreResult<UserToken> {
        let now = self.clock.now();
        let hashed = hash_token(unhashed_token);
        let mut state = self.state.write();

        let token = state
            .tokens
            .values_mut()
            .find(|t| t.auth_token == hashed || t.prev_auth_token == hashed)
            .ok_or_else(|| StoreError::NotFound("user token".into()))?;

        if cutoff(now, self.settings.max_lifetime).is_some_and(|c| token.created_at <= c)
            || cutoff(now, self.settings.max_inactive_lifetime)
                .is_some_and(|c| token.rotated_at <= c)
        {
            return Err(StoreError::TokenExpired);
        }

        // The previous token is still in use, so the rotated one never
        // reached the client: let it rotate again soon.
        if token.auth_token != hashed
            && token.prev_auth_token == hashed
            && token.auth_token_seen
            && token.rotated_at < now - URGENT_ROTATE_AFTER
        {
            token.auth_token_seen = false;
            tracing::debug!(token_id = token.id, "Previous session token reused");
        }

        if !token.auth_token_seen && token.auth_token == hashed {
            token.auth_token_seen = true;
            token.seen_at = Some(now);
        }

        Ok(UserToken {
            unhashed_token: unhashed_token.to_string(),
            ..token.clone()
        })
    }

    async fn try_rotate_token(
        &self,
        token: &UserToken,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> StoreResult<RotateOutcome> {
        let now = self.clock.now();

        if !self.needs_rotation(token, now) {
            return Ok(RotateOutcome {
                rotated: false,
                token: token.clone(),
            });
        }

        let mut state = self.state.write();
        let stored = state
            .tokens
            .get_mut(&token.id)
            .ok_or_else(|| StoreError::NotFound("user token".into()))?;

        // Compare-and-swap: another request rotated this token moments ago
        if !stored.auth_token_seen && stored.rotated_at >= now - ROTATION_GRACE {
            return Ok(RotateOutcome {
                rotated: false,
                token: token.clone(),
            });
        }

        let unhashed = random_token(TOKEN_LENGTH);
        if stored.auth_token_seen {
            stored.prev_auth_token = std::mem::take(&mut stored.auth_token);
        }
        stored.auth_token = hash_token(&unhashed);
        stored.auth_token_seen = false;
        stored.seen_at = None;
        stored.rotated_at = now;
        stored.client_ip = client_ip;
        user_agent.clone_into(&mut stored.user_agent);

        Ok(RotateOutcome {
            rotated: true,
            token: UserToken {
                unhashed_token: unhashed,
                ..stored.clone()
            },
        })
    }

    async fn get_org_by_name(&self, name: &str) -> StoreResult<Org> {
        self.state
            .read()
            .orgs
            .values()
            .find(|o| o.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("org {name}")))
    }

    async fn update_last_seen_at(&self, user_id: UserId) -> StoreResult<()> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let stored = state
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound)?;
        stored.last_seen_at = Some(now);
        Ok(())
    }

    async fn upsert_external_user(
        &self,
        info: &ExternalUserInfo,
        auto_sign_up: bool,
    ) -> StoreResult<User> {
        let mut state = self.state.write();
        let link = (info.auth_module.clone(), info.auth_id.clone());

        let existing = state
            .users
            .values()
            .find(|u| u.external_auth.as_ref() == Some(&link))
            .map(|u| u.user.id)
            .or_else(|| {
                [info.login.as_str(), info.email.as_str()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .find_map(|s| state.find_user_by_login(s))
            });

        let user_id = if let Some(id) = existing {
            id
        } else {
            if !auto_sign_up {
                return Err(StoreError::UserNotFound);
            }
            let org_id = state.lowest_org_id().ok_or_else(|| {
                StoreError::Backend("no organization to assign new user to".into())
            })?;
            let login = if info.login.is_empty() {
                info.email.clone()
            } else {
                info.login.clone()
            };
            let new = NewUser {
                login,
                email: info.email.clone(),
                name: info.name.clone(),
                password: None,
                is_admin: false,
            };
            state
                .insert_user(new, org_id, info.org_role.unwrap_or_default())?
                .id
        };

        let stored = state.users.get_mut(&user_id).ok_or(StoreError::UserNotFound)?;
        if !info.email.is_empty() {
            stored.user.email.clone_from(&info.email);
        }
        if !info.name.is_empty() {
            stored.user.name.clone_from(&info.name);
        }
        stored.external_auth = Some(link);
        stored.external_groups.clone_from(&info.groups);
        let user = stored.user.clone();

        if let Some(role) = info.org_role {
            state.memberships.insert((user.org_id, user.id), role);
        }

        Ok(user)
    }
}
