use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Identity store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = Error::Config("bad value".into());
        assert!(err.is_config());
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Configuration error: bad value");
    }

    #[test]
    fn test_transport_error() {
        let err = Error::Transport("bind failed".into());
        assert!(err.is_transport());
        assert!(err.to_string().contains("bind failed"));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: Error = StoreError::NotFound("org".into()).into();
        assert!(err.is_store());
        assert!(err.to_string().contains("org"));
    }
}
