//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > defaults

mod builder;
mod env;
mod file;
mod proxy;
mod session;

pub use builder::{AnonymousConfig, Config, ConfigBuilder, ServerConfig, TelemetryConfig};
pub use proxy::{AuthProxyConfig, ProxyAttribute, ProxyHeaderProperty, parse_attribute_headers};
pub use session::{SameSite, SessionConfig};

use crate::Result;

/// Load configuration with precedence: env > file > defaults
pub fn load_config() -> Result<ConfigBuilder> {
    let mut builder = ConfigBuilder::new();

    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    env::load_from_env(builder)
}

/// Load configuration from a specific file path
pub fn load_config_from_path(path: &std::path::Path) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, ConfigBuilder::new())?;
    env::load_from_env(builder)
}
