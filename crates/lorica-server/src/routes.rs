//! HTTP route handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::claims::{ValidationResult, bearer_token};
use crate::error::RelayError;
use crate::relay::RelayOutcome;
use crate::state::AppState;

/// Handle `GET /profile`: validate the bearer credential, then relay it to
/// the provider's UserInfo endpoint.
pub async fn profile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    // Missing or non-Bearer credentials are unauthenticated outright; the
    // validator never sees them.
    let Some(token) = bearer_token(header) else {
        tracing::debug!("request without bearer credential");
        return Err(RelayError::Unauthenticated);
    };

    let claims = match state.validator().validate_token(token).await {
        ValidationResult::Accepted(claims) => claims,
        ValidationResult::Rejected(reason) => {
            // The reason stays in the logs; the caller only sees 401.
            tracing::warn!(%reason, "bearer token rejected");
            return Err(RelayError::Unauthenticated);
        }
    };

    tracing::debug!(sub = %claims.sub, "token accepted, relaying to UserInfo");

    let cancel = state.shutdown_token().child_token();
    match state.relay().relay(token, &cancel).await {
        RelayOutcome::Success(body) => Ok((
            StatusCode::OK,
            [(CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()),
        RelayOutcome::Failure(status, _) => Err(RelayError::UpstreamStatus(status)),
    }
}

/// Handle `GET /health`.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lorica-relay"
    }))
}
