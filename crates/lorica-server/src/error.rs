//! Error types for the relay service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Relay service error.
///
/// Nothing here is fatal: every variant degrades to an HTTP error response.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Credential missing, malformed, or failed validation. The specific
    /// rejection reason is logged, never echoed to the caller.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The identity provider answered with a non-success status.
    #[error("Upstream returned {0}")]
    UpstreamStatus(u16),

    /// The identity provider could not be reached (network/timeout).
    #[error("Identity provider unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RelayError::UpstreamStatus(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            RelayError::Internal(msg) => {
                tracing::error!(status = %status, error = %msg, "relay error");
            }
            other => {
                tracing::warn!(status = %status, error = %other, "request failed");
            }
        }

        // Generic body only: upstream error detail and validation reasons
        // stay in the logs.
        let body = match &self {
            RelayError::Unauthenticated => "unauthenticated",
            RelayError::UpstreamStatus(_) => "identity provider request failed",
            RelayError::UpstreamUnavailable(_) => "identity provider unavailable",
            RelayError::Internal(_) => "internal error",
        };

        (status, body.to_string()).into_response()
    }
}
