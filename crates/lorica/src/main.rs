//! Lorica - OIDC token lifecycle and claims relay.
//!
//! Main entry point for the Lorica CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{login, serve};

/// Lorica - OIDC token lifecycle and claims relay
#[derive(Parser)]
#[command(name = "lorica")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the claims relay server
    Serve(serve::ServeArgs),

    /// Log in to the identity provider (PKCE) and print the session
    Login(login::LoginArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "lorica=debug,lorica_client=debug,lorica_server=debug,info"
    } else {
        "lorica=info,lorica_client=info,lorica_server=info,warn"
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Login(args) => login::run(args).await,
    }
}
