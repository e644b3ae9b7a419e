//! Identity provider client: endpoint layout, PKCE login, token exchange.
//!
//! Speaks the OpenID Connect endpoints of a Keycloak-style provider. The
//! initial login uses the PKCE authorization-code flow; everything after
//! that is silent refresh via the refresh_token grant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};
use crate::token::TokenGrant;

/// Default timeout for calls to the provider's token endpoint.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Identity provider configuration.
///
/// Every field is required; there are no production defaults.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Realm (tenant) identifier.
    pub realm: String,
    /// OAuth client identifier registered with the provider.
    pub client_id: String,
    /// Redirect URI registered for the client.
    pub redirect_uri: String,
    /// Requested scopes.
    pub scope: String,
    /// Timeout applied to every token-endpoint call.
    pub exchange_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: String::new(),
            redirect_uri: String::new(),
            scope: "openid profile email".to_string(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// The issuer URL, normalized without a trailing slash.
    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{}", self.base_url.trim_end_matches('/'), self.realm)
    }

    /// Authorization endpoint for the PKCE redirect.
    pub fn authorize_url(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.issuer_url())
    }

    /// Token endpoint for code exchange and refresh.
    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer_url())
    }

    /// UserInfo endpoint.
    pub fn userinfo_url(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.issuer_url())
    }
}

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair (S256).
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            verifier,
            challenge,
        }
    }
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Build the authorization URL for the PKCE login redirect.
pub fn authorization_url(config: &ProviderConfig, challenge: &str, state: &str) -> String {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", config.scope.as_str()),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", config.authorize_url(), query)
}

/// Parse the `code#state` handoff pasted back from the redirect page.
pub fn parse_code_state(input: &str) -> Result<(String, String)> {
    let trimmed = input.trim();
    let Some((code, state)) = trimmed.split_once('#') else {
        return Err(AuthError::InvalidRequest(
            "Invalid format. Expected: code#state".to_string(),
        ));
    };

    if code.is_empty() || state.is_empty() {
        return Err(AuthError::InvalidRequest(
            "Missing code or state".to_string(),
        ));
    }

    Ok((code.to_string(), state.to_string()))
}

/// The one network operation the refresher depends on.
///
/// Split out as a trait so refresh behavior is testable without a live
/// provider.
#[async_trait]
pub trait TokenExchange: Send + Sync + std::fmt::Debug {
    /// Exchange a refresh token for a fresh grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Shared exchange handle for use across async contexts.
pub type SharedExchange = Arc<dyn TokenExchange>;

/// Live provider client speaking RFC 6749 form-encoded grants.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    /// Build a live client. The config must be fully populated; there are no
    /// fallback values for the client registration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(AuthError::Config("client_id is required".to_string()));
        }
        if config.redirect_uri.is_empty() {
            return Err(AuthError::Config("redirect_uri is required".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.exchange_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Exchange an authorization code (PKCE) for the initial grant.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", verifier),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(self.config.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::Provider(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::Provider(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenExchange for ProviderClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params).await
    }
}
