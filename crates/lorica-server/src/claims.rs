//! Bearer token claims validation.
//!
//! Every inbound request is validated fresh; results are never cached, so
//! revocation and expiry take effect mid-session. Checks run in a fixed
//! order and short-circuit on the first failure: credential shape,
//! signature, issuer, time-based claims, audience.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::jwks::JwksCache;

/// Verified token claims exposed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    /// Audience; providers emit either a string or an array.
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub nbf: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Why a credential was rejected. Logged for operability; never echoed to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Header missing, not a Bearer credential, unparseable token, or a
    /// signature that does not verify against the issuer's keys.
    MalformedSignature,
    /// Issuer claim is not in the trusted set.
    UnknownIssuer,
    /// Expiry claim is in the past (beyond skew).
    Expired,
    /// Not-before/issued-at claim is in the future (beyond skew).
    NotYetValid,
    /// Audience validation is enabled and the expected audience is absent.
    AudienceMismatch,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::MalformedSignature => "malformed or unverifiable credential",
            RejectReason::UnknownIssuer => "unknown issuer",
            RejectReason::Expired => "token expired",
            RejectReason::NotYetValid => "token not yet valid",
            RejectReason::AudienceMismatch => "audience mismatch",
        };
        f.write_str(s)
    }
}

/// Outcome of validating one inbound credential.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    Accepted(Claims),
    Rejected(RejectReason),
}

/// Validates inbound bearer tokens against the issuer's published keys.
#[derive(Clone)]
pub struct ClaimsValidator {
    trusted_issuers: Vec<String>,
    expected_audience: Option<String>,
    clock_skew: Duration,
    keys: Arc<JwksCache>,
}

impl ClaimsValidator {
    pub fn new(
        trusted_issuers: Vec<String>,
        expected_audience: Option<String>,
        clock_skew: Duration,
        keys: Arc<JwksCache>,
    ) -> Self {
        Self {
            trusted_issuers,
            expected_audience,
            clock_skew,
            keys,
        }
    }

    /// Validate the raw `Authorization` header value of an inbound request.
    pub async fn validate(&self, header: Option<&str>) -> ValidationResult {
        let Some(token) = bearer_token(header) else {
            return ValidationResult::Rejected(RejectReason::MalformedSignature);
        };
        self.validate_token(token).await
    }

    /// Validate a bare token (header already stripped).
    pub async fn validate_token(&self, token: &str) -> ValidationResult {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(err) => {
                tracing::debug!(error = %err, "unparseable token header");
                return ValidationResult::Rejected(RejectReason::MalformedSignature);
            }
        };

        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
            tracing::debug!(alg = ?header.alg, "unsupported token algorithm");
            return ValidationResult::Rejected(RejectReason::MalformedSignature);
        }

        // Key lookup failures (including a JWKS endpoint we cannot reach
        // with an empty cache) fail closed: an unverifiable token is
        // rejected, never waved through.
        let key = match self.keys.decoding_key(header.kid.as_deref()).await {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "signing key unavailable, rejecting token");
                return ValidationResult::Rejected(RejectReason::MalformedSignature);
            }
        };

        // Signature only; issuer, audience, and time claims are checked
        // manually below so rejections carry a precise reason and honor the
        // configured skew and trailing-slash normalization.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = match decode::<Claims>(token, &key, &validation) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(error = %err, "token signature verification failed");
                return ValidationResult::Rejected(RejectReason::MalformedSignature);
            }
        };
        let claims = data.claims;

        if !self.issuer_trusted(&claims.iss) {
            return ValidationResult::Rejected(RejectReason::UnknownIssuer);
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let skew = self.clock_skew.as_secs();

        if claims.exp.saturating_add(skew) <= now {
            return ValidationResult::Rejected(RejectReason::Expired);
        }
        if let Some(nbf) = claims.nbf
            && nbf > now + skew
        {
            return ValidationResult::Rejected(RejectReason::NotYetValid);
        }
        if let Some(iat) = claims.iat
            && iat > now + skew
        {
            return ValidationResult::Rejected(RejectReason::NotYetValid);
        }

        if let Some(expected) = &self.expected_audience
            && !claims.aud.iter().any(|aud| aud == expected)
        {
            return ValidationResult::Rejected(RejectReason::AudienceMismatch);
        }

        ValidationResult::Accepted(claims)
    }

    fn issuer_trusted(&self, issuer: &str) -> bool {
        let normalized = issuer.trim_end_matches('/');
        self.trusted_issuers
            .iter()
            .any(|trusted| trusted.trim_end_matches('/') == normalized)
    }
}

/// Strip the case-insensitive `Bearer ` scheme from a header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let header = header?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn deserialize_audience<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct AudienceVisitor;

    impl<'de> Visitor<'de> for AudienceVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Vec<String>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(AudienceVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("BEARER abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_audience_deserializes_from_string_or_array() {
        let single: Claims = serde_json::from_value(serde_json::json!({
            "iss": "i", "sub": "s", "aud": "app", "exp": 1
        }))
        .unwrap();
        assert_eq!(single.aud, vec!["app"]);

        let many: Claims = serde_json::from_value(serde_json::json!({
            "iss": "i", "sub": "s", "aud": ["app", "account"], "exp": 1
        }))
        .unwrap();
        assert_eq!(many.aud, vec!["app", "account"]);

        let none: Claims = serde_json::from_value(serde_json::json!({
            "iss": "i", "sub": "s", "exp": 1
        }))
        .unwrap();
        assert!(none.aud.is_empty());
    }

    #[test]
    fn test_issuer_normalization() {
        let validator = ClaimsValidator::new(
            vec!["http://localhost:8080/realms/epm-realm".to_string()],
            None,
            Duration::from_secs(60),
            Arc::new(JwksCache::with_static_keys(jsonwebtoken::jwk::JwkSet {
                keys: vec![],
            })),
        );

        assert!(validator.issuer_trusted("http://localhost:8080/realms/epm-realm"));
        assert!(validator.issuer_trusted("http://localhost:8080/realms/epm-realm/"));
        assert!(!validator.issuer_trusted("http://evil.example/realms/epm-realm"));
    }
}
