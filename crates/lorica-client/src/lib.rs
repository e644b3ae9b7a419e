//! OIDC token lifecycle management for single-page-application style clients.
//!
//! Acquires, caches, refreshes, and attaches bearer access tokens so the
//! application never holds long-lived credentials. The identity provider is
//! consumed as a black box over HTTPS.
//!
//! # Components
//!
//! - [`store`]: session token state machine, the single source of truth
//! - [`refresher`]: proactive refresh with coalescing of concurrent callers
//! - [`attacher`]: bearer-credential middleware for outbound requests
//! - [`provider`]: PKCE login flow and token-endpoint exchange
//! - [`token`]: access token values and grant wire types

pub mod attacher;
pub mod error;
pub mod provider;
pub mod refresher;
pub mod store;
pub mod token;

pub use attacher::{CredentialAttacher, MIN_TOKEN_VALIDITY};
pub use error::{AuthError, Result};
pub use provider::{
    PkceChallenge, ProviderClient, ProviderConfig, SharedExchange, TokenExchange,
    authorization_url, generate_state, parse_code_state,
};
pub use refresher::TokenRefresher;
pub use store::{SessionSnapshot, TokenStore};
pub use token::{AccessToken, TokenGrant, TokenState};
