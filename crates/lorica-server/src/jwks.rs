//! Cached issuer signing keys (JWKS).
//!
//! The key set is fetched lazily and kept behind a read-write lock: many
//! validations read concurrently, the occasional refetch writes. Keys are
//! refetched when the TTL lapses or when a token arrives with an unknown
//! `kid` (key rotation). If a refetch fails, previously cached keys keep
//! serving; with an empty cache the lookup fails closed.

use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;

/// Errors from signing-key lookup.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("JWKS fetch failed: {0}")]
    Fetch(String),

    #[error("no signing key found for kid {0:?}")]
    KeyNotFound(Option<String>),

    #[error("token has no kid and the key set holds multiple keys")]
    AmbiguousKey,

    #[error("invalid JWK: {0}")]
    InvalidKey(String),
}

/// Lazily fetched, TTL-bound signing key set.
pub struct JwksCache {
    jwks_url: String,
    ttl: Duration,
    http: reqwest::Client,
    cached: RwLock<Option<CachedKeys>>,
    /// Static key sets (tests, pinned keys) are never refetched.
    fetch_enabled: bool,
}

#[derive(Debug)]
struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

impl JwksCache {
    pub fn new(jwks_url: String, ttl: Duration, upstream_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(upstream_timeout)
            .build()
            .unwrap_or_default();
        Self {
            jwks_url,
            ttl,
            http,
            cached: RwLock::new(None),
            fetch_enabled: true,
        }
    }

    /// Build a cache around a fixed key set that is never refetched.
    pub fn with_static_keys(keys: JwkSet) -> Self {
        Self {
            jwks_url: String::new(),
            ttl: Duration::MAX,
            http: reqwest::Client::new(),
            cached: RwLock::new(Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            })),
            fetch_enabled: false,
        }
    }

    /// Resolve the decoding key for a token's `kid` header.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                let fresh = entry.fetched_at.elapsed() < self.ttl;
                if fresh || !self.fetch_enabled {
                    if let Some(jwk) = select_jwk(&entry.keys, kid) {
                        return to_decoding_key(jwk);
                    }
                    if !self.fetch_enabled {
                        return Err(key_not_found(&entry.keys, kid));
                    }
                }
            } else if !self.fetch_enabled {
                return Err(JwksError::KeyNotFound(kid.map(str::to_string)));
            }
        }

        // Stale cache or unknown kid: refetch once, then retry the lookup.
        self.refresh().await?;

        let cached = self.cached.read().await;
        let entry = cached
            .as_ref()
            .ok_or_else(|| JwksError::KeyNotFound(kid.map(str::to_string)))?;
        match select_jwk(&entry.keys, kid) {
            Some(jwk) => to_decoding_key(jwk),
            None => Err(key_not_found(&entry.keys, kid)),
        }
    }

    async fn refresh(&self) -> Result<(), JwksError> {
        match self.fetch().await {
            Ok(keys) => {
                let mut cached = self.cached.write().await;
                *cached = Some(CachedKeys {
                    keys,
                    fetched_at: Instant::now(),
                });
                Ok(())
            }
            Err(err) => {
                let cached = self.cached.read().await;
                if cached.is_some() {
                    tracing::warn!(
                        jwks_url = %self.jwks_url,
                        error = %err,
                        "JWKS refresh failed; serving cached keys"
                    );
                    return Ok(());
                }
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, JwksError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Fetch(format!(
                "GET {} returned {}",
                self.jwks_url,
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))
    }
}

fn select_jwk<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys
            .keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid)),
        // No kid: unambiguous only with a single key.
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

fn key_not_found(keys: &JwkSet, kid: Option<&str>) -> JwksError {
    if kid.is_none() && keys.keys.len() > 1 {
        JwksError::AmbiguousKey
    } else {
        JwksError::KeyNotFound(kid.map(str::to_string))
    }
}

fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, JwksError> {
    DecodingKey::from_jwk(jwk).map_err(|e| JwksError::InvalidKey(e.to_string()))
}
