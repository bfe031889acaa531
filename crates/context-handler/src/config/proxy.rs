//! Auth proxy configuration

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::IpNetwork;
use crate::constants::DEFAULT_AUTH_PROXY_HEADER;

/// How the trust header value identifies the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyHeaderProperty {
    #[default]
    Username,
    Email,
}

impl FromStr for ProxyHeaderProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "username" => Ok(Self::Username),
            "email" => Ok(Self::Email),
            other => Err(format!("invalid auth proxy header property: {other}")),
        }
    }
}

/// Optional user attribute carried in its own proxy header
///
/// Ordering is fixed and feeds the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProxyAttribute {
    Name,
    Email,
    Login,
    Role,
    Groups,
}

impl ProxyAttribute {
    pub const ALL: [Self; 5] = [Self::Name, Self::Email, Self::Login, Self::Role, Self::Groups];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Email => "Email",
            Self::Login => "Login",
            Self::Role => "Role",
            Self::Groups => "Groups",
        }
    }
}

impl FromStr for ProxyAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown auth proxy attribute: {s}"))
    }
}

/// Parse `Name:X-WEBAUTH-NAME Email:X-WEBAUTH-EMAIL` style mappings
pub fn parse_attribute_headers(value: &str) -> Result<BTreeMap<ProxyAttribute, String>, String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (attr, header) = pair
                .split_once(':')
                .ok_or_else(|| format!("expected Attribute:Header, got '{pair}'"))?;
            if header.is_empty() {
                return Err(format!("missing header name for '{attr}'"));
            }
            Ok((attr.parse()?, header.to_string()))
        })
        .collect()
}

/// Auth proxy strategy configuration
#[derive(Debug, Clone)]
pub struct AuthProxyConfig {
    /// Default: false
    pub enabled: bool,
    /// Default: `X-WEBAUTH-USER`
    pub header_name: String,
    pub header_property: ProxyHeaderProperty,
    /// Create unknown users on first login. Default: true
    pub auto_sign_up: bool,
    /// Lifetime of cached user ids. Default: 15 minutes
    pub sync_ttl: Duration,
    /// Empty allows every peer
    pub whitelist: Vec<IpNetwork>,
    pub headers: BTreeMap<ProxyAttribute, String>,
}

impl Default for AuthProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: DEFAULT_AUTH_PROXY_HEADER.to_string(),
            header_property: ProxyHeaderProperty::Username,
            auto_sign_up: true,
            sync_ttl: Duration::from_secs(15 * 60),
            whitelist: Vec::new(),
            headers: BTreeMap::new(),
        }
    }
}
