//! TOML configuration file loading

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::builder::ConfigBuilder;
use super::proxy::{ProxyAttribute, ProxyHeaderProperty};
use super::session::SameSite;
use crate::auth::IpNetwork;
use crate::cache::CacheBackend;
use crate::types::OrgRole;
use crate::{Error, Result};

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./context-handler.toml",
    "~/.config/context-handler/config.toml",
    "/etc/context-handler/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(auth) = config.auth {
        if let Some(header) = auth.org_id_header {
            builder = builder.org_id_header(header);
        }
        if let Some(secs) = auth.last_seen_threshold_secs {
            builder = builder.last_seen_threshold(Duration::from_secs(secs));
        }
        if let Some(enabled) = auth.basic_enabled {
            builder = builder.basic_auth_enabled(enabled);
        }

        if let Some(session) = auth.session {
            builder = apply_session(builder, session)?;
        }
        if let Some(anonymous) = auth.anonymous {
            builder = apply_anonymous(builder, anonymous)?;
        }
        if let Some(proxy) = auth.proxy {
            builder = apply_proxy(builder, proxy)?;
        }
    }

    if let Some(cache) = config.cache {
        if let Some(enabled) = cache.enabled {
            builder = builder.cache_enabled(enabled);
        }
        if let Some(backend_str) = cache.backend {
            let backend: CacheBackend = backend_str
                .parse()
                .map_err(|e| Error::Config(format!("Invalid cache backend: {e}")))?;
            builder = builder.cache_backend(backend);
        }
        if let Some(ttl) = cache.default_ttl_secs {
            builder = builder.cache_default_ttl(Duration::from_secs(ttl));
        }
        if let Some(max) = cache.max_entries {
            builder = builder.cache_max_entries((max > 0).then_some(max));
        }
        if let Some(max) = cache.max_value_size {
            builder = builder.cache_max_value_size(max);
        }
    }

    if let Some(server) = config.server {
        if let Some(host_str) = server.host
            && let Ok(host) = host_str.parse::<IpAddr>()
        {
            builder = builder.http_host(host);
        }
        if let Some(port) = server.port {
            builder = builder.http_port(port);
        }
        if let Some(secs) = server.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
    }

    if let Some(obs) = config.observability {
        if let Some(name) = obs.service_name {
            builder = builder.service_name(name);
        }
        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }
        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

fn apply_session(mut builder: ConfigBuilder, session: SessionFileConfig) -> Result<ConfigBuilder> {
    if let Some(name) = session.cookie_name {
        builder = builder.login_cookie_name(name);
    }
    if let Some(secs) = session.max_lifetime_secs {
        builder = builder.login_max_lifetime(Duration::from_secs(secs));
    }
    if let Some(secs) = session.max_inactive_lifetime_secs {
        builder = builder.login_max_inactive_lifetime(Duration::from_secs(secs));
    }
    if let Some(secs) = session.rotation_interval_secs {
        builder = builder.token_rotation_interval(Duration::from_secs(secs));
    }
    if let Some(path) = session.cookie_path {
        builder = builder.cookie_path(path);
    }
    if let Some(secure) = session.cookie_secure {
        builder = builder.cookie_secure(secure);
    }
    if let Some(same_site) = session.cookie_same_site {
        let same_site: SameSite = same_site
            .parse()
            .map_err(|e| Error::Config(format!("Invalid cookie_same_site: {e}")))?;
        builder = builder.cookie_same_site(same_site);
    }
    Ok(builder)
}

fn apply_anonymous(
    mut builder: ConfigBuilder,
    anonymous: AnonymousFileConfig,
) -> Result<ConfigBuilder> {
    if let Some(enabled) = anonymous.enabled {
        builder = builder.anonymous_enabled(enabled);
    }
    if let Some(name) = anonymous.org_name {
        builder = builder.anonymous_org_name(name);
    }
    if let Some(role) = anonymous.org_role {
        let role: OrgRole = role
            .parse()
            .map_err(|e| Error::Config(format!("Invalid anonymous org_role: {e}")))?;
        builder = builder.anonymous_org_role(role);
    }
    Ok(builder)
}

fn apply_proxy(mut builder: ConfigBuilder, proxy: ProxyFileConfig) -> Result<ConfigBuilder> {
    if let Some(enabled) = proxy.enabled {
        builder = builder.auth_proxy_enabled(enabled);
    }
    if let Some(name) = proxy.header_name {
        builder = builder.auth_proxy_header_name(name);
    }
    if let Some(property) = proxy.header_property {
        let property: ProxyHeaderProperty = property
            .parse()
            .map_err(|e| Error::Config(format!("Invalid auth proxy header_property: {e}")))?;
        builder = builder.auth_proxy_header_property(property);
    }
    if let Some(auto_sign_up) = proxy.auto_sign_up {
        builder = builder.auth_proxy_auto_sign_up(auto_sign_up);
    }
    if let Some(secs) = proxy.sync_ttl_secs {
        builder = builder.auth_proxy_sync_ttl(Duration::from_secs(secs));
    }
    if let Some(entries) = proxy.whitelist {
        let list = entries
            .iter()
            .map(|entry| entry.parse::<IpNetwork>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("Invalid auth proxy whitelist: {e}")))?;
        builder = builder.auth_proxy_whitelist(list);
    }
    if let Some(headers) = proxy.headers {
        for (attribute, header) in headers {
            let attribute: ProxyAttribute = attribute
                .parse()
                .map_err(|e| Error::Config(format!("Invalid auth proxy header mapping: {e}")))?;
            builder = builder.auth_proxy_header(attribute, header);
        }
    }
    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    auth: Option<AuthFileConfig>,
    cache: Option<CacheFileConfig>,
    server: Option<ServerFileConfig>,
    observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Deserialize)]
struct AuthFileConfig {
    org_id_header: Option<String>,
    last_seen_threshold_secs: Option<u64>,
    basic_enabled: Option<bool>,
    session: Option<SessionFileConfig>,
    anonymous: Option<AnonymousFileConfig>,
    proxy: Option<ProxyFileConfig>,
}

#[derive(Debug, Deserialize)]
struct SessionFileConfig {
    cookie_name: Option<String>,
    max_lifetime_secs: Option<u64>,
    max_inactive_lifetime_secs: Option<u64>,
    rotation_interval_secs: Option<u64>,
    cookie_path: Option<String>,
    cookie_secure: Option<bool>,
    cookie_same_site: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnonymousFileConfig {
    enabled: Option<bool>,
    org_name: Option<String>,
    org_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyFileConfig {
    enabled: Option<bool>,
    header_name: Option<String>,
    header_property: Option<String>,
    auto_sign_up: Option<bool>,
    sync_ttl_secs: Option<u64>,
    whitelist: Option<Vec<String>>,
    headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CacheFileConfig {
    enabled: Option<bool>,
    backend: Option<String>,
    default_ttl_secs: Option<u64>,
    max_entries: Option<usize>,
    max_value_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    service_name: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}
