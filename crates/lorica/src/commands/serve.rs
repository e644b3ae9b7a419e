//! Serve command - run the claims relay server.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use lorica_server::{RelayConfig, Server};

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Identity provider base URL, e.g. http://localhost:8080
    #[arg(long, env = "LORICA_PROVIDER_URL")]
    pub provider_url: String,

    /// Realm (tenant) identifier
    #[arg(long, env = "LORICA_REALM")]
    pub realm: String,

    /// Expected token audience; omit to disable audience validation
    #[arg(long, env = "LORICA_AUDIENCE")]
    pub audience: Option<String>,

    /// Address to bind the server to
    #[arg(long, env = "LORICA_BIND", default_value = "127.0.0.1:7095")]
    pub bind: SocketAddr,

    /// Clock-skew allowance in seconds for token time claims
    #[arg(long, default_value_t = 60)]
    pub clock_skew_secs: u64,

    /// Seconds before cached signing keys are refetched
    #[arg(long, default_value_t = 300)]
    pub jwks_ttl_secs: u64,

    /// Disable CORS headers
    #[arg(long)]
    pub no_cors: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = RelayConfig::new(args.provider_url.as_str(), args.realm.as_str())
        .with_bind_address(args.bind)
        .with_clock_skew(Duration::from_secs(args.clock_skew_secs))
        .with_jwks_ttl(Duration::from_secs(args.jwks_ttl_secs))
        .with_cors(!args.no_cors);

    if let Some(audience) = &args.audience {
        config = config.with_expected_audience(audience);
    }

    tracing::info!(
        issuer = %config.issuer_url(),
        audience = ?config.expected_audience,
        "starting claims relay"
    );

    Server::new(config).run().await?;
    Ok(())
}
