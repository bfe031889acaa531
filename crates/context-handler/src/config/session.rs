//! Session cookie and token lifetime configuration

use std::str::FromStr;
use std::time::Duration;

use crate::constants::DEFAULT_LOGIN_COOKIE_NAME;
use crate::store::TokenSettings;

const DAY: u64 = 24 * 60 * 60;

/// `SameSite` attribute of the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
    /// Attribute omitted
    Disabled,
}

impl SameSite {
    #[must_use]
    pub const fn as_attribute(&self) -> Option<&'static str> {
        match self {
            Self::Lax => Some("Lax"),
            Self::Strict => Some("Strict"),
            Self::None => Some("None"),
            Self::Disabled => None,
        }
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            "disabled" | "" => Ok(Self::Disabled),
            other => Err(format!("invalid SameSite mode: {other}")),
        }
    }
}

/// Login session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Empty disables the session strategy
    pub login_cookie_name: String,
    /// Hard limit from login; also the cookie `Max-Age`. Default: 30 days
    pub login_max_lifetime: Duration,
    /// Limit since last rotation. Default: 7 days
    pub login_max_inactive_lifetime: Duration,
    /// Default: 10 minutes
    pub token_rotation_interval: Duration,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_cookie_name: DEFAULT_LOGIN_COOKIE_NAME.to_string(),
            login_max_lifetime: Duration::from_secs(30 * DAY),
            login_max_inactive_lifetime: Duration::from_secs(7 * DAY),
            token_rotation_interval: Duration::from_secs(10 * 60),
            cookie_path: "/".to_string(),
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
        }
    }
}

impl SessionConfig {
    /// Token lifetimes for the identity store
    #[must_use]
    pub fn token_settings(&self) -> TokenSettings {
        let convert = |d: Duration| chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX);
        TokenSettings {
            max_lifetime: convert(self.login_max_lifetime),
            max_inactive_lifetime: convert(self.login_max_inactive_lifetime),
            rotation_interval: convert(self.token_rotation_interval),
        }
    }
}
