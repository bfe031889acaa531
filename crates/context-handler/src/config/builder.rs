//! Configuration builder

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::proxy::{AuthProxyConfig, ProxyAttribute, ProxyHeaderProperty};
use super::session::{SameSite, SessionConfig};
use crate::Error;
use crate::auth::IpNetwork;
use crate::cache::{CacheBackend, CacheConfig};
use crate::constants::{DEFAULT_ANONYMOUS_ORG_NAME, DEFAULT_ORG_ID_HEADER};
use crate::types::OrgRole;

/// Context handler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Header carrying the requested organization id
    pub org_id_header: String,
    /// Last-seen timestamps older than this are refreshed
    pub last_seen_threshold: Duration,
    pub basic_auth_enabled: bool,
    pub session: SessionConfig,
    pub anonymous: AnonymousConfig,
    pub auth_proxy: AuthProxyConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn session(&self) -> &SessionConfig {
        &self.session
    }

    #[must_use]
    pub const fn auth_proxy(&self) -> &AuthProxyConfig {
        &self.auth_proxy
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheConfig {
        &self.cache
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            org_id_header: DEFAULT_ORG_ID_HEADER.to_string(),
            last_seen_threshold: DEFAULT_LAST_SEEN_THRESHOLD,
            basic_auth_enabled: true,
            session: SessionConfig::default(),
            anonymous: AnonymousConfig::default(),
            auth_proxy: AuthProxyConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            telemetry: TelemetryConfig {
                service_name: DEFAULT_SERVICE_NAME.to_string(),
                log_level: DEFAULT_LOG_LEVEL.to_string(),
                json_logs: false,
            },
        }
    }
}

const DEFAULT_LAST_SEEN_THRESHOLD: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SERVICE_NAME: &str = "context-handler";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Anonymous access configuration
#[derive(Debug, Clone)]
pub struct AnonymousConfig {
    /// Default: false
    pub enabled: bool,
    /// Organization anonymous users are scoped to. Default: `Main Org.`
    pub org_name: String,
    /// Default: Viewer
    pub org_role: OrgRole,
}

impl Default for AnonymousConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            org_name: DEFAULT_ANONYMOUS_ORG_NAME.to_string(),
            org_role: OrgRole::Viewer,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn org_id_header(mut self, header: impl Into<String>) -> Self {
        self.config.org_id_header = header.into();
        self
    }

    #[must_use]
    pub const fn last_seen_threshold(mut self, threshold: Duration) -> Self {
        self.config.last_seen_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn basic_auth_enabled(mut self, enabled: bool) -> Self {
        self.config.basic_auth_enabled = enabled;
        self
    }

    // Session

    /// Empty name disables the session strategy
    #[must_use]
    pub fn login_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.session.login_cookie_name = name.into();
        self
    }

    #[must_use]
    pub const fn login_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.session.login_max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub const fn login_max_inactive_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.session.login_max_inactive_lifetime = lifetime;
        self
    }

    #[must_use]
    pub const fn token_rotation_interval(mut self, interval: Duration) -> Self {
        self.config.session.token_rotation_interval = interval;
        self
    }

    #[must_use]
    pub fn cookie_path(mut self, path: impl Into<String>) -> Self {
        self.config.session.cookie_path = path.into();
        self
    }

    #[must_use]
    pub const fn cookie_secure(mut self, secure: bool) -> Self {
        self.config.session.cookie_secure = secure;
        self
    }

    #[must_use]
    pub const fn cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.config.session.cookie_same_site = same_site;
        self
    }

    // Anonymous

    #[must_use]
    pub const fn anonymous_enabled(mut self, enabled: bool) -> Self {
        self.config.anonymous.enabled = enabled;
        self
    }

    #[must_use]
    pub fn anonymous_org_name(mut self, name: impl Into<String>) -> Self {
        self.config.anonymous.org_name = name.into();
        self
    }

    #[must_use]
    pub const fn anonymous_org_role(mut self, role: OrgRole) -> Self {
        self.config.anonymous.org_role = role;
        self
    }

    // Auth proxy

    #[must_use]
    pub const fn auth_proxy_enabled(mut self, enabled: bool) -> Self {
        self.config.auth_proxy.enabled = enabled;
        self
    }

    #[must_use]
    pub fn auth_proxy_header_name(mut self, name: impl Into<String>) -> Self {
        self.config.auth_proxy.header_name = name.into();
        self
    }

    #[must_use]
    pub const fn auth_proxy_header_property(mut self, property: ProxyHeaderProperty) -> Self {
        self.config.auth_proxy.header_property = property;
        self
    }

    #[must_use]
    pub const fn auth_proxy_auto_sign_up(mut self, enabled: bool) -> Self {
        self.config.auth_proxy.auto_sign_up = enabled;
        self
    }

    #[must_use]
    pub const fn auth_proxy_sync_ttl(mut self, ttl: Duration) -> Self {
        self.config.auth_proxy.sync_ttl = ttl;
        self
    }

    #[must_use]
    pub fn auth_proxy_whitelist(mut self, list: Vec<IpNetwork>) -> Self {
        self.config.auth_proxy.whitelist = list;
        self
    }

    /// Map a user attribute to the proxy header carrying it
    #[must_use]
    pub fn auth_proxy_header(
        mut self,
        attribute: ProxyAttribute,
        header: impl Into<String>,
    ) -> Self {
        self.config.auth_proxy.headers.insert(attribute, header.into());
        self
    }

    // Cache

    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn cache_backend(mut self, backend: CacheBackend) -> Self {
        self.config.cache.backend = backend;
        self
    }

    #[must_use]
    pub const fn cache_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.default_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn cache_max_entries(mut self, max: Option<usize>) -> Self {
        self.config.cache.max_entries = max;
        self
    }

    #[must_use]
    pub const fn cache_max_value_size(mut self, max: usize) -> Self {
        self.config.cache.max_value_size = max;
        self
    }

    // Server and telemetry

    #[must_use]
    pub const fn http_host(mut self, host: IpAddr) -> Self {
        self.config.server.host = host;
        self
    }

    #[must_use]
    pub const fn http_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn service_name(mut self, name: String) -> Self {
        self.config.telemetry.service_name = name;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.config.telemetry.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.config.telemetry.json_logs = enabled;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> crate::Result<Config> {
        let mut config = self.config;

        if config.org_id_header.trim().is_empty() {
            config.org_id_header = DEFAULT_ORG_ID_HEADER.to_string();
        }
        if config.telemetry.service_name.is_empty() {
            config.telemetry.service_name = DEFAULT_SERVICE_NAME.to_string();
        }
        if config.telemetry.log_level.is_empty() {
            config.telemetry.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        if config.session.cookie_path.is_empty() {
            config.session.cookie_path = "/".to_string();
        }

        validate_cookie_name(&config.session.login_cookie_name)?;

        if config.session.login_max_lifetime.is_zero() {
            return Err(Error::Config("login_max_lifetime must be positive".into()));
        }
        if config.session.login_max_inactive_lifetime.is_zero() {
            return Err(Error::Config(
                "login_max_inactive_lifetime must be positive".into(),
            ));
        }
        if config.session.cookie_same_site == SameSite::None && !config.session.cookie_secure {
            tracing::warn!("SameSite=None session cookies are rejected by browsers unless secure");
        }

        if config.auth_proxy.enabled && config.auth_proxy.header_name.trim().is_empty() {
            return Err(Error::Config(
                "auth proxy is enabled but no header name is set".into(),
            ));
        }

        if config.anonymous.enabled && config.anonymous.org_name.trim().is_empty() {
            return Err(Error::Config(
                "anonymous access is enabled but no organization is set".into(),
            ));
        }

        Ok(config)
    }
}

fn validate_cookie_name(name: &str) -> crate::Result<()> {
    let invalid = name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ',' | '='));
    if invalid {
        return Err(Error::Config(format!("invalid login cookie name: {name:?}")));
    }
    Ok(())
}
