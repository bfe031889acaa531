//! Identity types shared by strategies and stores

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type OrgId = i64;

/// Role of a principal inside an organization (hierarchical)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum OrgRole {
    #[default]
    Viewer,
    Editor,
    Admin,
}

impl OrgRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "Viewer",
            Self::Editor => "Editor",
            Self::Admin => "Admin",
        }
    }

    /// Whether this role grants at least the permissions of `other`
    #[must_use]
    pub fn includes(&self, other: Self) -> bool {
        *self >= other
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown org role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Org {
    pub id: OrgId,
    pub name: String,
}

/// User account as returned by a credential check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub name: String,
    pub org_id: OrgId,
    pub is_admin: bool,
}

/// Fully resolved user scoped to one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub org_name: String,
    pub org_role: OrgRole,
    pub login: String,
    pub name: String,
    pub email: String,
    pub is_grafana_admin: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Stored API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub org_id: OrgId,
    pub name: String,
    pub hashed_key: String,
    pub role: OrgRole,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Live session token
///
/// `unhashed_token` is only populated right after creation or rotation and is
/// never persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub id: i64,
    pub user_id: UserId,
    pub auth_token: String,
    pub prev_auth_token: String,
    pub user_agent: String,
    pub client_ip: Option<IpAddr>,
    pub auth_token_seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub rotated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub unhashed_token: String,
}

impl fmt::Debug for UserToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("auth_token_seen", &self.auth_token_seen)
            .field("rotated_at", &self.rotated_at)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Result of a conditional token rotation
#[derive(Debug, Clone)]
pub struct RotateOutcome {
    pub rotated: bool,
    pub token: UserToken,
}

/// Identity issued to the image renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderUser {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub org_role: OrgRole,
}

/// User attributes asserted by an external system (auth proxy, LDAP)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUserInfo {
    pub auth_module: String,
    pub auth_id: String,
    pub login: String,
    pub email: String,
    pub name: String,
    pub org_role: Option<OrgRole>,
    pub groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_role_ordering() {
        assert!(OrgRole::Admin > OrgRole::Editor);
        assert!(OrgRole::Editor > OrgRole::Viewer);
        assert!(OrgRole::Admin.includes(OrgRole::Viewer));
        assert!(!OrgRole::Viewer.includes(OrgRole::Editor));
    }

    #[test]
    fn test_org_role_parse() {
        assert_eq!("Viewer".parse::<OrgRole>().unwrap(), OrgRole::Viewer);
        assert_eq!("EDITOR".parse::<OrgRole>().unwrap(), OrgRole::Editor);
        assert_eq!(" admin ".parse::<OrgRole>().unwrap(), OrgRole::Admin);
        assert!("owner".parse::<OrgRole>().is_err());
    }

    #[test]
    fn test_org_role_display() {
        assert_eq!(OrgRole::Editor.to_string(), "Editor");
    }

    #[test]
    fn test_user_token_debug_hides_secrets() {
        let now = Utc::now();
        let token = UserToken {
            id: 1,
            user_id: 2,
            auth_token: "hashed-secret".into(),
            prev_auth_token: "prev-hashed".into(),
            user_agent: String::new(),
            client_ip: None,
            auth_token_seen: false,
            seen_at: None,
            rotated_at: now,
            created_at: now,
            unhashed_token: "raw-secret".into(),
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("raw-secret"));
        assert!(!debug.contains("hashed-secret"));
    }
}
