use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::upstream::UpstreamError;
use crate::types::ApiMessage;

/// Errors a relay handler can end with.
///
/// Every variant renders as `{"success": false, "message": ...}` with a
/// declared status, so no handler ever surfaces a framework error page.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The upstream call ran past its timeout.
    #[error("Request timeout")]
    Timeout,

    /// The upstream backend refused the connection.
    #[error("Backend unavailable")]
    Unreachable,

    /// Any other network failure; carries the client-facing message.
    #[error("{0}")]
    Network(&'static str),

    /// The client's request body could not be decoded.
    #[error("Invalid request body")]
    InvalidBody,

    /// The client's input broke a validation rule.
    #[error("{0}")]
    Validation(String),

    /// Upstream reported success with a body the relay could not read.
    #[error("Invalid response from backend")]
    BadUpstream,

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Map an upstream failure, reporting refused connections as `fallback`.
    ///
    /// Only the status relay distinguishes "backend down" (503); the other
    /// routes report it as a plain network error.
    pub(crate) fn from_upstream(err: UpstreamError, fallback: &'static str) -> Self {
        match err {
            UpstreamError::Timeout => Self::Timeout,
            UpstreamError::Connect(_) | UpstreamError::Transport(_) | UpstreamError::Url(_) => {
                Self::Network(fallback)
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Network(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidBody | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BadUpstream => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout => Self::Timeout,
            UpstreamError::Connect(_) => Self::Unreachable,
            UpstreamError::Transport(_) | UpstreamError::Url(_) => Self::Network("Network error"),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Config(_) => {
                tracing::error!(error = %self, "Relay internal error");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };
        (self.status(), Json(ApiMessage::failure(message))).into_response()
    }
}
