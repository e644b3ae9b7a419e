//! Error types for the token lifecycle client.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while acquiring or refreshing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Network/HTTP error talking to the identity provider.
    #[error("Network error: {0}")]
    Network(String),

    /// The identity provider returned an error response.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Invalid request or callback input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}
