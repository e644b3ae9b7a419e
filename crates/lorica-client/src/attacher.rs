//! Credential attacher: bearer-token middleware for outbound requests.
//!
//! Requests for protected endpoints get an `Authorization: Bearer` header
//! from the refresher; everything else passes through untouched. When no
//! token is available the request still goes out bare; the backend is the
//! authority on whether the call may proceed.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;

use crate::refresher::TokenRefresher;

/// Minimum remaining validity demanded before attaching a token.
///
/// Tokens inside this window are proactively refreshed so they cannot expire
/// mid-flight.
pub const MIN_TOKEN_VALIDITY: Duration = Duration::from_secs(30);

/// Attaches bearer credentials to requests aimed at protected endpoints.
#[derive(Debug, Clone)]
pub struct CredentialAttacher {
    refresher: TokenRefresher,
    protected_prefixes: Vec<String>,
    min_validity: Duration,
}

impl CredentialAttacher {
    pub fn new(refresher: TokenRefresher, protected_prefixes: Vec<String>) -> Self {
        Self {
            refresher,
            protected_prefixes,
            min_validity: MIN_TOKEN_VALIDITY,
        }
    }

    pub fn with_min_validity(mut self, min_validity: Duration) -> Self {
        self.min_validity = min_validity;
        self
    }

    /// Whether a URL targets one of the protected endpoint prefixes.
    pub fn is_protected(&self, url: &reqwest::Url) -> bool {
        let target = url.as_str();
        self.protected_prefixes
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()))
    }

    /// Intercept an outbound request, attaching a bearer credential if the
    /// destination is protected and a token is available.
    ///
    /// Re-checks token validity synchronously before every dispatch; a token
    /// known to be expiring within the validity window is never attached
    /// without a refresh attempt first.
    pub async fn intercept(&self, mut request: reqwest::Request) -> reqwest::Request {
        if !self.is_protected(request.url()) {
            return request;
        }

        match self.refresher.ensure_valid(self.min_validity).await {
            Some(token) => {
                let value = format!("Bearer {}", token.raw());
                match value.parse() {
                    Ok(header) => {
                        request.headers_mut().insert(AUTHORIZATION, header);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "token is not a valid header value, sending request bare");
                    }
                }
            }
            None => {
                tracing::debug!(url = %request.url(), "no token available, sending request unauthenticated");
            }
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::provider::TokenExchange;
    use crate::store::TokenStore;
    use crate::token::{TokenGrant, fake_jwt, now_secs};
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct NeverExchange;

    #[async_trait]
    impl TokenExchange for NeverExchange {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
            panic!("exchange must not be called");
        }
    }

    fn attacher_with_token(expiry_offset: i64) -> CredentialAttacher {
        let store = Arc::new(TokenStore::new());
        if expiry_offset != 0 {
            let exp = (now_secs() as i64 + expiry_offset).max(0) as u64;
            store.set(&TokenGrant {
                access_token: fake_jwt(serde_json::json!({"exp": exp, "sub": "u"})),
                refresh_token: None,
                expires_in: expiry_offset.max(0) as u64,
                token_type: "Bearer".to_string(),
                scope: String::new(),
            });
        }
        let refresher = TokenRefresher::new(store, Arc::new(NeverExchange));
        CredentialAttacher::new(refresher, vec!["https://localhost:7095/".to_string()])
    }

    fn request(url: &str) -> reqwest::Request {
        reqwest::Client::new().get(url).build().unwrap()
    }

    #[tokio::test]
    async fn test_attaches_bearer_to_protected_request() {
        let attacher = attacher_with_token(3600);
        let req = attacher
            .intercept(request("https://localhost:7095/api/profile"))
            .await;

        let header = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(header.starts_with("Bearer "));
    }

    #[tokio::test]
    async fn test_unprotected_request_passes_through() {
        let attacher = attacher_with_token(3600);
        let req = attacher
            .intercept(request("https://other-service.example.com/data"))
            .await;

        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_absent_token_sends_request_bare() {
        let attacher = attacher_with_token(0);
        let req = attacher
            .intercept(request("https://localhost:7095/api/profile"))
            .await;

        // Passed through without a header; the backend rejects it.
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }
}
