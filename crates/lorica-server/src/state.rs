//! Shared application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::claims::ClaimsValidator;
use crate::config::RelayConfig;
use crate::jwks::JwksCache;
use crate::relay::UserInfoRelay;

/// State shared by all request handlers.
///
/// Cheap to clone; everything mutable lives behind the JWKS cache's own
/// lock. Requests are otherwise independent.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: RelayConfig,
    validator: ClaimsValidator,
    relay: UserInfoRelay,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build state from config, wiring the JWKS cache to the provider.
    pub fn new(config: RelayConfig) -> Self {
        let keys = Arc::new(JwksCache::new(
            config.jwks_url(),
            config.jwks_ttl,
            config.upstream_timeout,
        ));
        Self::with_keys(config, keys)
    }

    /// Build state around a pre-seeded key cache (tests, pinned keys).
    pub fn with_keys(config: RelayConfig, keys: Arc<JwksCache>) -> Self {
        let validator = ClaimsValidator::new(
            vec![config.issuer_url()],
            config.expected_audience.clone(),
            config.clock_skew,
            keys,
        );
        let relay = UserInfoRelay::new(config.userinfo_url(), config.upstream_timeout);

        Self {
            inner: Arc::new(Inner {
                config,
                validator,
                relay,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn validator(&self) -> &ClaimsValidator {
        &self.inner.validator
    }

    pub fn relay(&self) -> &UserInfoRelay {
        &self.inner.relay
    }

    /// Root cancellation token; cancelled on graceful shutdown so in-flight
    /// upstream calls are abandoned.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}
