//! The token store: single source of truth for the session's access token.
//!
//! Single-writer, many-reader. Every transition replaces the whole state
//! atomically; readers never observe a partial update. The store performs no
//! network I/O; that is the refresher's job.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::token::{AccessToken, TokenGrant, TokenState};

/// Holds the most recent access token, its state, and the refresh token
/// used to exchange it for a fresh one.
#[derive(Debug, Default)]
pub struct TokenStore {
    state: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: TokenState,
    refresh_token: Option<String>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            token: TokenState::Absent,
            refresh_token: None,
        }
    }
}

/// Serializable view of the store for session-scoped persistence.
///
/// Must only ever live in session-scoped storage (so a page reload does not
/// force re-authentication); never write this to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token state.
    pub fn state(&self) -> TokenState {
        self.state.read().token.clone()
    }

    /// Replace the held token with a freshly granted one.
    pub fn set(&self, grant: &TokenGrant) {
        let token = AccessToken::from_grant(grant);
        let mut inner = self.state.write();
        inner.token = TokenState::Valid(token);
        if grant.refresh_token.is_some() {
            inner.refresh_token = grant.refresh_token.clone();
        }
    }

    /// Reset to `Absent` (explicit sign-out).
    pub fn clear(&self) {
        let mut inner = self.state.write();
        inner.token = TokenState::Absent;
        inner.refresh_token = None;
    }

    /// The refresh token for the next exchange, if one is held.
    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    /// Fast path: the held token, if it stays valid for at least
    /// `min_validity` more. Returns `None` while a refresh is in flight so
    /// callers join the pending exchange instead of racing it.
    pub fn fresh_token(&self, min_validity: Duration) -> Option<AccessToken> {
        match &self.state.read().token {
            TokenState::Valid(token) if token.remaining_secs() > min_validity.as_secs() => {
                Some(token.clone())
            }
            _ => None,
        }
    }

    /// Transition into `Refreshing`, returning the prior token (if any) so
    /// the refresher can fall back to it on failure.
    pub(crate) fn begin_refresh(&self) -> Option<AccessToken> {
        let mut inner = self.state.write();
        let prior = match &inner.token {
            TokenState::Valid(t) | TokenState::Expired(t) => Some(t.clone()),
            TokenState::Refreshing(t) => t.clone(),
            TokenState::Absent => None,
        };
        inner.token = TokenState::Refreshing(prior.clone());
        prior
    }

    /// Successful exchange: store the new grant and return its token.
    pub(crate) fn complete_refresh(&self, grant: &TokenGrant) -> AccessToken {
        let token = AccessToken::from_grant(grant);
        let mut inner = self.state.write();
        inner.token = TokenState::Valid(token.clone());
        // Keycloak rotates refresh tokens; keep the old one if the grant
        // omitted a replacement.
        if grant.refresh_token.is_some() {
            inner.refresh_token = grant.refresh_token.clone();
        }
        token
    }

    /// Failed exchange: restore the prior state. A stale-but-unexpired token
    /// stays usable; a literally expired one is kept as `Expired` so the next
    /// caller retries the exchange.
    pub(crate) fn fail_refresh(&self) {
        let mut inner = self.state.write();
        let next = match &inner.token {
            TokenState::Refreshing(Some(t)) => {
                if t.is_expired() {
                    TokenState::Expired(t.clone())
                } else {
                    TokenState::Valid(t.clone())
                }
            }
            TokenState::Refreshing(None) => TokenState::Absent,
            other => other.clone(),
        };
        inner.token = next;
    }

    /// Snapshot for session-scoped persistence, if a token is held.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let inner = self.state.read();
        let access_token = match &inner.token {
            TokenState::Valid(t) | TokenState::Expired(t) => t.raw().to_string(),
            TokenState::Refreshing(Some(t)) => t.raw().to_string(),
            _ => return None,
        };
        Some(SessionSnapshot {
            access_token,
            refresh_token: inner.refresh_token.clone(),
        })
    }

    /// Rehydrate from a session snapshot. A token that fails to parse is
    /// discarded; an already expired one is restored as `Expired` so the
    /// refresher exchanges it on first use.
    pub fn restore(&self, snapshot: &SessionSnapshot) {
        let Some(token) = AccessToken::from_raw(&snapshot.access_token) else {
            tracing::debug!("discarding unparseable session token");
            return;
        };

        let mut inner = self.state.write();
        inner.token = if token.is_expired() {
            TokenState::Expired(token)
        } else {
            TokenState::Valid(token)
        };
        inner.refresh_token = snapshot.refresh_token.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{fake_jwt, now_secs};

    fn grant_with_exp(offset: i64) -> TokenGrant {
        let exp = (now_secs() as i64 + offset).max(0) as u64;
        TokenGrant {
            access_token: fake_jwt(serde_json::json!({"exp": exp, "sub": "u"})),
            refresh_token: Some("refresh-1".to_string()),
            expires_in: offset.max(0) as u64,
            token_type: "Bearer".to_string(),
            scope: String::new(),
        }
    }

    #[test]
    fn test_starts_absent() {
        let store = TokenStore::new();
        assert_eq!(store.state(), TokenState::Absent);
        assert!(store.fresh_token(Duration::from_secs(0)).is_none());
    }

    #[test]
    fn test_set_and_clear() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(300));
        assert!(matches!(store.state(), TokenState::Valid(_)));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));

        store.clear();
        assert_eq!(store.state(), TokenState::Absent);
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_fresh_token_honors_min_validity() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(20));

        assert!(store.fresh_token(Duration::from_secs(5)).is_some());
        // 20s remaining is inside the 30s proactive-refresh window.
        assert!(store.fresh_token(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn test_no_fresh_token_while_refreshing() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(300));
        store.begin_refresh();
        assert!(store.fresh_token(Duration::from_secs(0)).is_none());
    }

    #[test]
    fn test_failed_refresh_keeps_stale_token() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(20));

        let prior = store.begin_refresh();
        assert!(prior.is_some());
        store.fail_refresh();

        // Stale but not literally expired: still usable as a fallback.
        assert!(matches!(store.state(), TokenState::Valid(_)));
    }

    #[test]
    fn test_failed_refresh_of_expired_token() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(-10));

        store.begin_refresh();
        store.fail_refresh();
        assert!(matches!(store.state(), TokenState::Expired(_)));
    }

    #[test]
    fn test_failed_refresh_from_absent() {
        let store = TokenStore::new();
        store.begin_refresh();
        store.fail_refresh();
        assert_eq!(store.state(), TokenState::Absent);
    }

    #[test]
    fn test_refresh_token_kept_when_grant_omits_it() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(300));

        let mut rotated = grant_with_exp(600);
        rotated.refresh_token = None;
        store.complete_refresh(&rotated);

        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(300));
        let snapshot = store.snapshot().unwrap();

        let restored = TokenStore::new();
        restored.restore(&snapshot);
        assert!(matches!(restored.state(), TokenState::Valid(_)));
        assert_eq!(restored.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_restore_expired_token() {
        let store = TokenStore::new();
        store.set(&grant_with_exp(-30));
        let snapshot = store.snapshot().unwrap();

        let restored = TokenStore::new();
        restored.restore(&snapshot);
        assert!(matches!(restored.state(), TokenState::Expired(_)));
    }

    #[test]
    fn test_restore_discards_garbage() {
        let store = TokenStore::new();
        store.restore(&SessionSnapshot {
            access_token: "not-a-jwt".to_string(),
            refresh_token: None,
        });
        assert_eq!(store.state(), TokenState::Absent);
    }
}
