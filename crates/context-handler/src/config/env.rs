//! Environment variable loading for configuration

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use super::builder::ConfigBuilder;
use super::proxy::{ProxyHeaderProperty, parse_attribute_headers};
use super::session::SameSite;
use crate::auth::parse_allow_list;
use crate::cache::CacheBackend;
use crate::types::OrgRole;
use crate::{Error, Result};

/// Environment variable names
mod vars {
    pub const AUTH_ORG_ID_HEADER: &str = "AUTH_ORG_ID_HEADER";
    pub const AUTH_LAST_SEEN_THRESHOLD_SECS: &str = "AUTH_LAST_SEEN_THRESHOLD_SECS";
    pub const AUTH_BASIC_ENABLED: &str = "AUTH_BASIC_ENABLED";
    pub const AUTH_LOGIN_COOKIE_NAME: &str = "AUTH_LOGIN_COOKIE_NAME";
    pub const AUTH_LOGIN_MAX_LIFETIME_SECS: &str = "AUTH_LOGIN_MAX_LIFETIME_SECS";
    pub const AUTH_LOGIN_MAX_INACTIVE_LIFETIME_SECS: &str = "AUTH_LOGIN_MAX_INACTIVE_LIFETIME_SECS";
    pub const AUTH_TOKEN_ROTATION_INTERVAL_SECS: &str = "AUTH_TOKEN_ROTATION_INTERVAL_SECS";
    pub const AUTH_COOKIE_SECURE: &str = "AUTH_COOKIE_SECURE";
    pub const AUTH_COOKIE_SAMESITE: &str = "AUTH_COOKIE_SAMESITE";
    pub const AUTH_ANONYMOUS_ENABLED: &str = "AUTH_ANONYMOUS_ENABLED";
    pub const AUTH_ANONYMOUS_ORG_NAME: &str = "AUTH_ANONYMOUS_ORG_NAME";
    pub const AUTH_ANONYMOUS_ORG_ROLE: &str = "AUTH_ANONYMOUS_ORG_ROLE";
    pub const AUTH_PROXY_ENABLED: &str = "AUTH_PROXY_ENABLED";
    pub const AUTH_PROXY_HEADER_NAME: &str = "AUTH_PROXY_HEADER_NAME";
    pub const AUTH_PROXY_HEADER_PROPERTY: &str = "AUTH_PROXY_HEADER_PROPERTY";
    pub const AUTH_PROXY_AUTO_SIGN_UP: &str = "AUTH_PROXY_AUTO_SIGN_UP";
    pub const AUTH_PROXY_SYNC_TTL_SECS: &str = "AUTH_PROXY_SYNC_TTL_SECS";
    pub const AUTH_PROXY_WHITELIST: &str = "AUTH_PROXY_WHITELIST";
    pub const AUTH_PROXY_HEADERS: &str = "AUTH_PROXY_HEADERS";
    pub const CACHE_ENABLED: &str = "CACHE_ENABLED";
    pub const CACHE_BACKEND: &str = "CACHE_BACKEND";
    pub const CACHE_DEFAULT_TTL_SECS: &str = "CACHE_DEFAULT_TTL_SECS";
    pub const CACHE_MAX_ENTRIES: &str = "CACHE_MAX_ENTRIES";
    pub const SERVER_HOST: &str = "SERVER_HOST";
    pub const SERVER_PORT: &str = "SERVER_PORT";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const LOG_JSON: &str = "LOG_JSON";
}

fn secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn invalid(name: &str, err: impl std::fmt::Display) -> Error {
    Error::Config(format!("Invalid {name}: {err}"))
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(header) = env::var(vars::AUTH_ORG_ID_HEADER) {
        builder = builder.org_id_header(header);
    }
    if let Some(threshold) = secs(vars::AUTH_LAST_SEEN_THRESHOLD_SECS) {
        builder = builder.last_seen_threshold(threshold);
    }
    if let Ok(val) = env::var(vars::AUTH_BASIC_ENABLED) {
        builder = builder.basic_auth_enabled(parse_bool(&val));
    }

    // Session
    if let Ok(name) = env::var(vars::AUTH_LOGIN_COOKIE_NAME) {
        builder = builder.login_cookie_name(name);
    }
    if let Some(lifetime) = secs(vars::AUTH_LOGIN_MAX_LIFETIME_SECS) {
        builder = builder.login_max_lifetime(lifetime);
    }
    if let Some(lifetime) = secs(vars::AUTH_LOGIN_MAX_INACTIVE_LIFETIME_SECS) {
        builder = builder.login_max_inactive_lifetime(lifetime);
    }
    if let Some(interval) = secs(vars::AUTH_TOKEN_ROTATION_INTERVAL_SECS) {
        builder = builder.token_rotation_interval(interval);
    }
    if let Ok(val) = env::var(vars::AUTH_COOKIE_SECURE) {
        builder = builder.cookie_secure(parse_bool(&val));
    }
    if let Ok(val) = env::var(vars::AUTH_COOKIE_SAMESITE) {
        let same_site: SameSite = val
            .parse()
            .map_err(|e| invalid(vars::AUTH_COOKIE_SAMESITE, e))?;
        builder = builder.cookie_same_site(same_site);
    }

    // Anonymous
    if let Ok(val) = env::var(vars::AUTH_ANONYMOUS_ENABLED) {
        builder = builder.anonymous_enabled(parse_bool(&val));
    }
    if let Ok(name) = env::var(vars::AUTH_ANONYMOUS_ORG_NAME) {
        builder = builder.anonymous_org_name(name);
    }
    if let Ok(val) = env::var(vars::AUTH_ANONYMOUS_ORG_ROLE) {
        let role: OrgRole = val
            .parse()
            .map_err(|e| invalid(vars::AUTH_ANONYMOUS_ORG_ROLE, e))?;
        builder = builder.anonymous_org_role(role);
    }

    // Auth proxy
    if let Ok(val) = env::var(vars::AUTH_PROXY_ENABLED) {
        builder = builder.auth_proxy_enabled(parse_bool(&val));
    }
    if let Ok(name) = env::var(vars::AUTH_PROXY_HEADER_NAME) {
        builder = builder.auth_proxy_header_name(name);
    }
    if let Ok(val) = env::var(vars::AUTH_PROXY_HEADER_PROPERTY) {
        let property: ProxyHeaderProperty = val
            .parse()
            .map_err(|e| invalid(vars::AUTH_PROXY_HEADER_PROPERTY, e))?;
        builder = builder.auth_proxy_header_property(property);
    }
    if let Ok(val) = env::var(vars::AUTH_PROXY_AUTO_SIGN_UP) {
        builder = builder.auth_proxy_auto_sign_up(parse_bool(&val));
    }
    if let Some(ttl) = secs(vars::AUTH_PROXY_SYNC_TTL_SECS) {
        builder = builder.auth_proxy_sync_ttl(ttl);
    }
    if let Ok(val) = env::var(vars::AUTH_PROXY_WHITELIST) {
        let list = parse_allow_list(&val).map_err(|e| invalid(vars::AUTH_PROXY_WHITELIST, e))?;
        builder = builder.auth_proxy_whitelist(list);
    }
    if let Ok(val) = env::var(vars::AUTH_PROXY_HEADERS) {
        let headers =
            parse_attribute_headers(&val).map_err(|e| invalid(vars::AUTH_PROXY_HEADERS, e))?;
        for (attribute, header) in headers {
            builder = builder.auth_proxy_header(attribute, header);
        }
    }

    // Cache
    if let Ok(val) = env::var(vars::CACHE_ENABLED) {
        builder = builder.cache_enabled(parse_bool(&val));
    }
    if let Ok(val) = env::var(vars::CACHE_BACKEND) {
        let backend: CacheBackend = val.parse().map_err(|e| invalid(vars::CACHE_BACKEND, e))?;
        builder = builder.cache_backend(backend);
    }
    if let Some(ttl) = secs(vars::CACHE_DEFAULT_TTL_SECS) {
        builder = builder.cache_default_ttl(ttl);
    }
    if let Ok(val) = env::var(vars::CACHE_MAX_ENTRIES)
        && let Ok(max) = val.trim().parse::<usize>()
    {
        builder = builder.cache_max_entries((max > 0).then_some(max));
    }

    // Server
    if let Ok(host_str) = env::var(vars::SERVER_HOST)
        && let Ok(host) = host_str.parse::<IpAddr>()
    {
        builder = builder.http_host(host);
    }
    if let Ok(port_str) = env::var(vars::SERVER_PORT)
        && let Ok(port) = port_str.parse::<u16>()
    {
        builder = builder.http_port(port);
    }

    // Telemetry
    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }
    if let Ok(val) = env::var(vars::LOG_JSON) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

pub(crate) fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::ProxyAttribute;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let old_values: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::set_var(key, value) };
        }

        let result = f();

        for (key, old_value) in old_values {
            match old_value {
                // SAFETY: We hold a mutex lock to ensure no concurrent modifications
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" 1 "));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_load_session_settings() {
        with_env_vars(
            &[
                ("AUTH_LOGIN_COOKIE_NAME", "sid"),
                ("AUTH_LOGIN_MAX_LIFETIME_SECS", "86400"),
                ("AUTH_TOKEN_ROTATION_INTERVAL_SECS", "120"),
                ("AUTH_COOKIE_SECURE", "true"),
                ("AUTH_COOKIE_SAMESITE", "strict"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new()).unwrap().build().unwrap();
                assert_eq!(config.session.login_cookie_name, "sid");
                assert_eq!(config.session.login_max_lifetime, Duration::from_secs(86400));
                assert_eq!(config.session.token_rotation_interval, Duration::from_secs(120));
                assert!(config.session.cookie_secure);
                assert_eq!(config.session.cookie_same_site, SameSite::Strict);
            },
        );
    }

    #[test]
    fn test_load_invalid_same_site() {
        with_env_vars(&[("AUTH_COOKIE_SAMESITE", "sometimes")], || {
            let err = load_from_env(ConfigBuilder::new()).unwrap_err();
            assert!(err.to_string().contains("AUTH_COOKIE_SAMESITE"));
        });
    }

    #[test]
    fn test_load_anonymous() {
        with_env_vars(
            &[
                ("AUTH_ANONYMOUS_ENABLED", "yes"),
                ("AUTH_ANONYMOUS_ORG_NAME", "Public"),
                ("AUTH_ANONYMOUS_ORG_ROLE", "editor"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new()).unwrap().build().unwrap();
                assert!(config.anonymous.enabled);
                assert_eq!(config.anonymous.org_name, "Public");
                assert_eq!(config.anonymous.org_role, OrgRole::Editor);
            },
        );
    }

    #[test]
    fn test_load_invalid_anonymous_role() {
        with_env_vars(&[("AUTH_ANONYMOUS_ORG_ROLE", "owner")], || {
            assert!(load_from_env(ConfigBuilder::new()).is_err());
        });
    }

    #[test]
    fn test_load_invalid_cache_backend() {
        with_env_vars(&[("CACHE_BACKEND", "memroy")], || {
            let err = load_from_env(ConfigBuilder::new()).unwrap_err();
            assert!(err.is_config());
        });
    }

    #[test]
    fn test_load_auth_proxy() {
        with_env_vars(
            &[
                ("AUTH_PROXY_ENABLED", "true"),
                ("AUTH_PROXY_HEADER_NAME", "X-USER"),
                ("AUTH_PROXY_HEADER_PROPERTY", "email"),
                ("AUTH_PROXY_AUTO_SIGN_UP", "false"),
                ("AUTH_PROXY_SYNC_TTL_SECS", "60"),
                ("AUTH_PROXY_WHITELIST", "10.0.0.0/8, 127.0.0.1"),
                ("AUTH_PROXY_HEADERS", "Name:X-NAME Email:X-EMAIL"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new()).unwrap().build().unwrap();
                let proxy = &config.auth_proxy;
                assert!(proxy.enabled);
                assert_eq!(proxy.header_name, "X-USER");
                assert_eq!(proxy.header_property, ProxyHeaderProperty::Email);
                assert!(!proxy.auto_sign_up);
                assert_eq!(proxy.sync_ttl, Duration::from_secs(60));
                assert_eq!(proxy.whitelist.len(), 2);
                assert_eq!(proxy.headers[&ProxyAttribute::Email], "X-EMAIL");
            },
        );
    }

    #[test]
    fn test_load_invalid_whitelist() {
        with_env_vars(&[("AUTH_PROXY_WHITELIST", "10.0.0.0/99")], || {
            let err = load_from_env(ConfigBuilder::new()).unwrap_err();
            assert!(err.is_config());
        });
    }

    #[test]
    fn test_load_cache_and_server() {
        with_env_vars(
            &[
                ("CACHE_ENABLED", "false"),
                ("CACHE_BACKEND", "noop"),
                ("CACHE_MAX_ENTRIES", "0"),
                ("SERVER_HOST", "0.0.0.0"),
                ("SERVER_PORT", "8081"),
                ("LOG_JSON", "1"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new()).unwrap().build().unwrap();
                assert!(!config.cache.enabled);
                assert_eq!(config.cache.backend, CacheBackend::Noop);
                assert_eq!(config.cache.max_entries, None);
                assert_eq!(config.server.host, "0.0.0.0".parse::<IpAddr>().unwrap());
                assert_eq!(config.server.port, 8081);
                assert!(config.telemetry.json_logs);
            },
        );
    }

    #[test]
    fn test_load_invalid_numbers_ignored() {
        with_env_vars(
            &[
                ("SERVER_PORT", "not_a_port"),
                ("AUTH_LAST_SEEN_THRESHOLD_SECS", "soon"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new()).unwrap().build().unwrap();
                assert_eq!(config.server.port, 3000);
                assert_eq!(config.last_seen_threshold, Duration::from_secs(300));
            },
        );
    }
}
