//! Access token values and the session token state machine.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// Token response from the identity provider's token endpoint.
///
/// The wire shape Keycloak (and any RFC 6749 provider) returns from both the
/// authorization_code and refresh_token grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

/// An access token plus the metadata derived from it.
///
/// Immutable once built; a refreshed token is a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: String,
    /// Absolute expiry, unix seconds.
    expires_at: u64,
    issuer: Option<String>,
    subject: Option<String>,
}

/// The subset of JWT claims the client reads without verification.
///
/// The client never trusts these for authorization decisions; they only
/// drive proactive refresh scheduling. The backend re-validates everything.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    exp: u64,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

impl AccessToken {
    /// Build a token from a grant, deriving expiry from the JWT payload.
    ///
    /// Opaque (non-JWT) tokens fall back to `now + expires_in` from the grant.
    pub fn from_grant(grant: &TokenGrant) -> Self {
        match decode_unverified(&grant.access_token) {
            Some(claims) => Self {
                raw: grant.access_token.clone(),
                expires_at: claims.exp,
                issuer: claims.iss,
                subject: claims.sub,
            },
            None => Self {
                raw: grant.access_token.clone(),
                expires_at: now_secs() + grant.expires_in,
                issuer: None,
                subject: None,
            },
        }
    }

    /// Rebuild a token from its raw form (session restore path).
    pub fn from_raw(raw: &str) -> Option<Self> {
        let claims = decode_unverified(raw)?;
        Some(Self {
            raw: raw.to_string(),
            expires_at: claims.exp,
            issuer: claims.iss,
            subject: claims.sub,
        })
    }

    /// The raw bearer value to put on the wire.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Absolute expiry in unix seconds.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Whether the token is past its expiry right now.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_secs()
    }

    /// Seconds of validity remaining (zero if expired).
    pub fn remaining_secs(&self) -> u64 {
        self.expires_at.saturating_sub(now_secs())
    }

    #[cfg(test)]
    pub(crate) fn for_test(raw: &str, expires_at: u64) -> Self {
        Self {
            raw: raw.to_string(),
            expires_at,
            issuer: None,
            subject: None,
        }
    }
}

/// Token state for one authenticated session.
///
/// Exactly one state exists per session; all transitions go through the
/// [`TokenStore`](crate::store::TokenStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// No token has been acquired (or the session was cleared).
    Absent,
    /// A token is held; it may or may not still be within its validity window.
    Valid(AccessToken),
    /// An exchange with the provider is in flight. Carries the stale token,
    /// if any, so a failed refresh can fall back to it.
    Refreshing(Option<AccessToken>),
    /// The last refresh failed and the held token is past expiry.
    Expired(AccessToken),
}

fn decode_unverified(raw: &str) -> Option<UnverifiedClaims> {
    let mut parts = raw.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub(crate) fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Build an unsigned JWT with the given payload (client never verifies).
#[cfg(test)]
pub(crate) fn fake_jwt(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{}.{}.sig", header, body)
}
