//! UserInfo relay: forwards an accepted bearer token to the identity
//! provider and hands the profile JSON back verbatim.
//!
//! The relay does not reshape or validate the profile schema; that belongs
//! to the consumer. Upstream error bodies are never forwarded, only the
//! status code, with a generic message, so provider-internal detail stays
//! out of responses.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

/// Outcome of one relay call. Lives only for the duration of the request.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    /// Upstream 200: the raw JSON body, byte-for-byte.
    Success(String),
    /// Upstream failure: status code and a generic message.
    Failure(u16, String),
}

/// Client-closed-request (nginx convention); used when the inbound caller
/// disconnects before the upstream call finishes. Never reaches the wire.
const STATUS_CLIENT_CLOSED: u16 = 499;

/// Forwards bearer tokens to the provider's UserInfo endpoint.
#[derive(Debug, Clone)]
pub struct UserInfoRelay {
    userinfo_url: String,
    http: reqwest::Client,
}

impl UserInfoRelay {
    pub fn new(userinfo_url: String, upstream_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(upstream_timeout)
            .build()
            .unwrap_or_default();
        Self { userinfo_url, http }
    }

    /// Forward the (already validated) token upstream. Aborts the upstream
    /// call if `cancel` fires first. Timeouts and network errors are
    /// ordinary failures, never a crash.
    pub async fn relay(&self, bearer_token: &str, cancel: &CancellationToken) -> RelayOutcome {
        let request = self
            .http
            .get(&self.userinfo_url)
            .header(AUTHORIZATION, format!("Bearer {}", bearer_token));

        let response = tokio::select! {
            response = request.send() => response,
            _ = cancel.cancelled() => {
                tracing::debug!(url = %self.userinfo_url, "caller gone, abandoning upstream call");
                return RelayOutcome::Failure(
                    STATUS_CLIENT_CLOSED,
                    "client disconnected".to_string(),
                );
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %self.userinfo_url, error = %err, "UserInfo call failed");
                return RelayOutcome::Failure(502, "identity provider unavailable".to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.userinfo_url, status = %status, "UserInfo returned error");
            return RelayOutcome::Failure(status.as_u16(), "upstream rejected request".to_string());
        }

        match response.text().await {
            Ok(body) => RelayOutcome::Success(body),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read UserInfo body");
                RelayOutcome::Failure(502, "identity provider unavailable".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::get};
    use tokio::net::TcpListener;

    async fn spawn_upstream(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_success_body_relayed_verbatim() {
        let body = r#"{"sub":"user-1","email":"user@example.com","nested":{"k":[1,2,3]}}"#;
        let base = spawn_upstream(Router::new().route(
            "/userinfo",
            get(move || async move {
                ([("content-type", "application/json")], body)
            }),
        ))
        .await;

        let relay = UserInfoRelay::new(format!("{}/userinfo", base), Duration::from_secs(5));
        match relay.relay("token", &CancellationToken::new()).await {
            RelayOutcome::Success(relayed) => assert_eq!(relayed, body),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_status_preserved_body_dropped() {
        let base = spawn_upstream(Router::new().route(
            "/userinfo",
            get(|| async {
                (
                    axum::http::StatusCode::SERVICE_UNAVAILABLE,
                    "keycloak internal detail",
                )
            }),
        ))
        .await;

        let relay = UserInfoRelay::new(format!("{}/userinfo", base), Duration::from_secs(5));
        match relay.relay("token", &CancellationToken::new()).await {
            RelayOutcome::Failure(status, message) => {
                assert_eq!(status, 503);
                assert!(!message.contains("keycloak internal detail"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_generic_failure() {
        // Nothing listens here.
        let relay = UserInfoRelay::new(
            "http://127.0.0.1:1/userinfo".to_string(),
            Duration::from_secs(1),
        );
        match relay.relay("token", &CancellationToken::new()).await {
            RelayOutcome::Failure(status, _) => assert_eq!(status, 502),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_abandons_upstream_call() {
        let base = spawn_upstream(Router::new().route(
            "/userinfo",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "too late"
            }),
        ))
        .await;

        let relay = UserInfoRelay::new(format!("{}/userinfo", base), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        match relay.relay("token", &cancel).await {
            RelayOutcome::Failure(status, _) => assert_eq!(status, 499),
            other => panic!("expected cancellation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forwards_bearer_header() {
        let base = spawn_upstream(Router::new().route(
            "/userinfo",
            get(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                auth
            }),
        ))
        .await;

        let relay = UserInfoRelay::new(format!("{}/userinfo", base), Duration::from_secs(5));
        match relay.relay("tok-123", &CancellationToken::new()).await {
            RelayOutcome::Success(body) => assert_eq!(body, "Bearer tok-123"),
            other => panic!("expected success, got {:?}", other),
        }
    }
}
