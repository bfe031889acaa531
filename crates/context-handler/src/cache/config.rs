//! Cache configuration types

use std::str::FromStr;
use std::time::Duration;

/// Default maximum value size: 64KB
pub const DEFAULT_MAX_VALUE_SIZE: usize = 65_536;

/// Cache backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    Noop,
    #[default]
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "noop" | "none" => Ok(Self::Noop),
            other => Err(format!("unknown cache backend: {other}")),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    /// TTL applied when a caller passes none
    pub default_ttl: Duration,
    /// Maximum entries for in-memory cache
    pub max_entries: Option<usize>,
    pub max_value_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            default_ttl: Duration::from_secs(900),
            max_entries: Some(10_000),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}
