//! Login command - PKCE authorization-code flow against the provider.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use lorica_client::provider::{
    PkceChallenge, ProviderClient, ProviderConfig, authorization_url, generate_state,
    parse_code_state,
};
use lorica_client::store::TokenStore;
use lorica_client::token::AccessToken;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Identity provider base URL, e.g. http://localhost:8080
    #[arg(long, env = "LORICA_PROVIDER_URL")]
    pub provider_url: String,

    /// Realm (tenant) identifier
    #[arg(long, env = "LORICA_REALM")]
    pub realm: String,

    /// OAuth client identifier
    #[arg(long, env = "LORICA_CLIENT_ID")]
    pub client_id: String,

    /// Redirect URI registered for the client
    #[arg(long, env = "LORICA_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Requested scopes
    #[arg(long, default_value = "openid profile email")]
    pub scope: String,
}

/// Run the login command.
pub async fn run(args: LoginArgs) -> Result<()> {
    let config = ProviderConfig::new(args.provider_url.as_str(), args.realm.as_str())
        .with_client_id(args.client_id.as_str())
        .with_redirect_uri(args.redirect_uri.as_str())
        .with_scope(args.scope.as_str());

    let pkce = PkceChallenge::generate();
    let state = generate_state();
    let url = authorization_url(&config, &pkce.challenge, &state);

    println!("Open this URL in your browser:");
    println!();
    println!("  {}", url);
    println!();
    println!("After authenticating, paste the code#state value here:");
    println!();
    print!("code#state> ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    let (code, returned_state) = parse_code_state(&input)?;
    if returned_state != state {
        anyhow::bail!("State mismatch; possible CSRF, aborting login");
    }

    let client = ProviderClient::new(config)?;
    let grant = client.exchange_code(&code, &pkce.verifier).await?;

    let store = TokenStore::new();
    store.set(&grant);
    let token = AccessToken::from_grant(&grant);

    println!();
    println!("Login successful.");
    println!("  subject:    {}", token.subject().unwrap_or("(opaque token)"));
    println!("  expires in: {} seconds", token.remaining_secs());

    // Printed so a caller can persist and later restore the session.
    if let Some(snapshot) = store.snapshot() {
        println!();
        println!("session: {}", serde_json::to_string(&snapshot)?);
    }

    Ok(())
}
