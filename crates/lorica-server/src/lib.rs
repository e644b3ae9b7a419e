//! Claims relay server.
//!
//! Validates inbound bearer tokens against the identity provider's
//! published signing keys, then relays accepted tokens to the provider's
//! UserInfo endpoint and returns the profile JSON verbatim. Rejected
//! credentials get a 401 with a generic body; the precise reason goes to
//! the logs only.
//!
//! # Example
//!
//! ```ignore
//! use lorica_server::{RelayConfig, Server};
//!
//! let config = RelayConfig::new("http://localhost:8080", "epm-realm")
//!     .with_expected_audience("epm-hrms-profile");
//! Server::new(config).run().await?;
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod relay;
pub mod routes;
pub mod state;

pub use claims::{Claims, ClaimsValidator, RejectReason, ValidationResult, bearer_token};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use jwks::{JwksCache, JwksError};
pub use relay::{RelayOutcome, UserInfoRelay};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The claims relay HTTP server.
pub struct Server {
    state: AppState,
    enable_cors: bool,
}

impl Server {
    /// Create a server from config.
    pub fn new(config: RelayConfig) -> Self {
        let enable_cors = config.enable_cors;
        Self {
            state: AppState::new(config),
            enable_cors,
        }
    }

    /// Create a server around pre-built state (tests, pinned keys).
    pub fn from_state(state: AppState) -> Self {
        let enable_cors = state.config().enable_cors;
        Self { state, enable_cors }
    }

    /// Build the axum router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/profile", get(routes::profile_handler))
            .route("/health", get(routes::health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        if self.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Run the server until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.state.config().bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting claims relay server");
        axum::serve(listener, self.router()).await
    }

    /// Run with graceful shutdown, returning the bound address.
    ///
    /// When `shutdown` resolves, the listener stops accepting connections
    /// and in-flight upstream calls are cancelled.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.state.config().bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting claims relay server");

        let router = self.router();
        let cancel = self.state.shutdown_token().clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                    cancel.cancel();
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "claims relay server exited with error");
            }
        });

        Ok(local_addr)
    }
}
