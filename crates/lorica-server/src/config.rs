//! Relay service configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Clock-skew allowance for expiry and not-before checks (60 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Timeout for outbound calls to the identity provider.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// How long fetched signing keys stay fresh before a refetch.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(300);

/// Configuration for the claims relay.
///
/// Provider base URL and realm are required; there are no production
/// defaults for them. Audience validation is an explicit choice: `None`
/// disables it (some providers omit or vary the audience claim), `Some`
/// enforces it.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identity provider base URL, e.g. `http://localhost:8080`.
    pub provider_base_url: String,

    /// Realm (tenant) identifier.
    pub realm: String,

    /// Expected audience. `None` disables audience validation.
    pub expected_audience: Option<String>,

    /// Clock-skew allowance for time-based claim checks.
    pub clock_skew: Duration,

    /// Timeout for JWKS fetches and UserInfo forwards.
    pub upstream_timeout: Duration,

    /// TTL of the cached signing key set.
    pub jwks_ttl: Duration,

    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Allow cross-origin requests (the SPA lives on a different origin).
    pub enable_cors: bool,
}

impl RelayConfig {
    pub fn new(provider_base_url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            provider_base_url: provider_base_url.into(),
            realm: realm.into(),
            expected_audience: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            jwks_ttl: DEFAULT_JWKS_TTL,
            bind_address: "127.0.0.1:7095".parse().expect("valid literal address"),
            enable_cors: true,
        }
    }

    /// Enable audience validation against the given audience.
    pub fn with_expected_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.enable_cors = enabled;
        self
    }

    /// The trusted issuer URL, normalized without a trailing slash.
    pub fn issuer_url(&self) -> String {
        format!(
            "{}/realms/{}",
            self.provider_base_url.trim_end_matches('/'),
            self.realm
        )
    }

    /// JWKS endpoint for the realm's signing keys.
    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer_url())
    }

    /// UserInfo endpoint the relay forwards to.
    pub fn userinfo_url(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.issuer_url())
    }
}
