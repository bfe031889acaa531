//! Terminal authentication failures

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failure that ends the strategy chain with an error response
///
/// Messages are fixed strings safe to show to clients. `Internal` causes are
/// logged and never serialized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("{message}")]
    Unauthorized {
        message: &'static str,
        cause: Option<String>,
    },

    #[error("{message}: {detail}")]
    ProxyRejected {
        message: &'static str,
        detail: String,
    },

    #[error("{message}")]
    Internal {
        message: &'static str,
        cause: String,
    },
}

impl AuthFailure {
    #[must_use]
    pub const fn unauthorized(message: &'static str) -> Self {
        Self::Unauthorized {
            message,
            cause: None,
        }
    }

    #[must_use]
    pub fn unauthorized_with(message: &'static str, cause: impl ToString) -> Self {
        Self::Unauthorized {
            message,
            cause: Some(cause.to_string()),
        }
    }

    #[must_use]
    pub fn proxy_rejected(message: &'static str, detail: impl Into<String>) -> Self {
        Self::ProxyRejected {
            message,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn internal(message: &'static str, cause: impl ToString) -> Self {
        Self::Internal {
            message,
            cause: cause.to_string(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::ProxyRejected { .. } => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Unauthorized { message, .. }
            | Self::ProxyRejected { message, .. }
            | Self::Internal { message, .. } => *message,
        }
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthorized { message, cause } => {
                if let Some(cause) = cause {
                    tracing::debug!(error = %cause, "{message}");
                }
                json!({ "message": message })
            }
            Self::ProxyRejected { message, detail } => {
                json!({ "message": message, "detail": detail })
            }
            Self::Internal { message, cause } => {
                tracing::error!(error = %cause, "{message}");
                json!({ "message": message })
            }
        };
        (status, Json(body)).into_response()
    }
}
