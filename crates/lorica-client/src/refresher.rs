//! Proactive token refresh with coalescing.
//!
//! `ensure_valid` is the only suspension point in the token lifecycle: it
//! either returns the cached token immediately, or joins/starts exactly one
//! in-flight exchange with the provider. However many callers arrive while a
//! token is expiring, one network exchange happens per expiry window and
//! every caller is resolved with its result (or the best fallback).

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::provider::SharedExchange;
use crate::store::TokenStore;
use crate::token::AccessToken;

type InflightRefresh = Shared<BoxFuture<'static, Option<AccessToken>>>;

/// Keeps the session's access token valid, coalescing concurrent refreshes.
#[derive(Clone)]
pub struct TokenRefresher {
    store: Arc<TokenStore>,
    exchange: SharedExchange,
    inflight: Arc<Mutex<Option<InflightRefresh>>>,
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("store", &self.store)
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl TokenRefresher {
    pub fn new(store: Arc<TokenStore>, exchange: SharedExchange) -> Self {
        Self {
            store,
            exchange,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Return a token valid for at least `min_validity` more, refreshing if
    /// needed. Never errors: provider failures degrade to the stale cached
    /// token while it is not literally expired, else `None`.
    pub async fn ensure_valid(&self, min_validity: Duration) -> Option<AccessToken> {
        if let Some(token) = self.store.fresh_token(min_validity) {
            return Some(token);
        }

        let pending = {
            let mut slot = self.inflight.lock();
            // Re-check under the lock: a refresh may have completed between
            // the fast path and here.
            if let Some(token) = self.store.fresh_token(min_validity) {
                return Some(token);
            }
            match &*slot {
                Some(existing) => existing.clone(),
                None => {
                    let fut = refresh_task(
                        self.store.clone(),
                        self.exchange.clone(),
                        self.inflight.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        pending.await
    }
}

/// The single in-flight exchange. All waiters hold a `Shared` handle to this
/// future; it always resolves, success or not.
async fn refresh_task(
    store: Arc<TokenStore>,
    exchange: SharedExchange,
    inflight: Arc<Mutex<Option<InflightRefresh>>>,
) -> Option<AccessToken> {
    let prior = store.begin_refresh();

    let result = match store.refresh_token() {
        Some(refresh_token) => exchange.refresh(&refresh_token).await,
        None => Err(crate::error::AuthError::Config(
            "No refresh token held; re-authentication required".to_string(),
        )),
    };

    let outcome = match result {
        Ok(grant) => {
            let token = store.complete_refresh(&grant);
            tracing::debug!(expires_at = token.expires_at(), "access token refreshed");
            Some(token)
        }
        Err(err) => {
            tracing::warn!(error = %err, "token refresh failed, falling back to cached token");
            store.fail_refresh();
            prior.filter(|t| !t.is_expired())
        }
    };

    // Clear the slot so the next expiry window starts a new exchange. Waiters
    // already hold the Shared handle and are unaffected.
    inflight.lock().take();

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, Result};
    use crate::provider::TokenExchange;
    use crate::token::{TokenGrant, TokenState, fake_jwt, now_secs};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Exchange stub: counts calls, optionally fails, and yields to the
    /// scheduler so concurrent callers pile up behind one exchange.
    #[derive(Debug)]
    struct MockExchange {
        calls: AtomicU32,
        fail: bool,
        expires_in: u64,
    }

    impl MockExchange {
        fn ok(expires_in: u64) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
                expires_in,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: true,
                expires_in: 0,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for MockExchange {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(AuthError::Network("connection refused".to_string()));
            }
            let exp = now_secs() + self.expires_in;
            Ok(TokenGrant {
                access_token: fake_jwt(serde_json::json!({"exp": exp, "sub": "u"})),
                refresh_token: Some("rotated".to_string()),
                expires_in: self.expires_in,
                token_type: "Bearer".to_string(),
                scope: String::new(),
            })
        }
    }

    fn store_with_token(expiry_offset: i64) -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::new());
        let exp = (now_secs() as i64 + expiry_offset).max(0) as u64;
        store.set(&TokenGrant {
            access_token: fake_jwt(serde_json::json!({"exp": exp, "sub": "u"})),
            refresh_token: Some("rt".to_string()),
            expires_in: expiry_offset.max(0) as u64,
            token_type: "Bearer".to_string(),
            scope: String::new(),
        });
        store
    }

    #[tokio::test]
    async fn test_fast_path_issues_no_exchange() {
        let store = store_with_token(3600);
        let exchange = Arc::new(MockExchange::ok(3600));
        let refresher = TokenRefresher::new(store, exchange.clone());

        for _ in 0..5 {
            let token = refresher.ensure_valid(Duration::from_secs(30)).await;
            assert!(token.is_some());
        }
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_refresh() {
        let store = store_with_token(-10);
        let exchange = Arc::new(MockExchange::ok(3600));
        let refresher = TokenRefresher::new(store.clone(), exchange.clone());

        let token = refresher.ensure_valid(Duration::from_secs(30)).await.unwrap();
        assert!(token.remaining_secs() > 3000);
        assert_eq!(exchange.calls(), 1);
        assert_eq!(store.refresh_token().as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_refresh_inside_validity_threshold() {
        // Token expires in 10s; a 30s minimum validity must refresh it even
        // though it is not literally expired yet.
        let store = store_with_token(10);
        let exchange = Arc::new(MockExchange::ok(3600));
        let refresher = TokenRefresher::new(store, exchange.clone());

        let token = refresher.ensure_valid(Duration::from_secs(30)).await.unwrap();
        assert!(token.remaining_secs() > 30);
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_coalesce() {
        let store = store_with_token(-10);
        let exchange = Arc::new(MockExchange::ok(3600));
        let refresher = TokenRefresher::new(store, exchange.clone());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let r = refresher.clone();
            handles.push(tokio::spawn(async move {
                r.ensure_valid(Duration::from_secs(30)).await
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        // Exactly one exchange, same token for everyone.
        assert_eq!(exchange.calls(), 1);
        let first = &tokens[0];
        assert!(tokens.iter().all(|t| t == first));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_refresh_resolves_all_waiters() {
        let store = store_with_token(-10);
        let exchange = Arc::new(MockExchange::failing());
        let refresher = TokenRefresher::new(store.clone(), exchange.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = refresher.clone();
            handles.push(tokio::spawn(async move {
                r.ensure_valid(Duration::from_secs(30)).await
            }));
        }

        for handle in handles {
            // Old token is literally expired, so the fallback is Absent.
            assert!(handle.await.unwrap().is_none());
        }
        assert_eq!(exchange.calls(), 1);
        assert!(matches!(store.state(), TokenState::Expired(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_stale_token() {
        // 10s of validity left: below the 30s threshold, so a refresh is
        // attempted; when it fails the stale token is still returned.
        let store = store_with_token(10);
        let exchange = Arc::new(MockExchange::failing());
        let refresher = TokenRefresher::new(store.clone(), exchange.clone());

        let token = refresher.ensure_valid(Duration::from_secs(30)).await;
        assert!(token.is_some());
        assert!(token.unwrap().remaining_secs() <= 10);
        assert!(matches!(store.state(), TokenState::Valid(_)));
    }

    #[tokio::test]
    async fn test_next_caller_retries_after_failure() {
        let store = store_with_token(-10);
        let exchange = Arc::new(MockExchange::failing());
        let refresher = TokenRefresher::new(store, exchange.clone());

        assert!(refresher.ensure_valid(Duration::from_secs(30)).await.is_none());
        assert!(refresher.ensure_valid(Duration::from_secs(30)).await.is_none());
        // No background retry loop: one exchange per caller-initiated attempt.
        assert_eq!(exchange.calls(), 2);
    }

    #[tokio::test]
    async fn test_absent_without_refresh_token() {
        let store = Arc::new(TokenStore::new());
        let exchange = Arc::new(MockExchange::ok(3600));
        let refresher = TokenRefresher::new(store, exchange.clone());

        let token = refresher.ensure_valid(Duration::from_secs(30)).await;
        assert!(token.is_none());
        assert_eq!(exchange.calls(), 0);
    }
}
