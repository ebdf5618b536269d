use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pushgate::auth::{CredentialHasher, SessionToken, Username};
use pushgate::config::{Config, Secret};
use pushgate::push::VapidKeys;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Allow-listed login and web push broadcast gateway
#[derive(Parser)]
#[command(name = "pushgate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Path to config.toml (defaults to the platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,

        /// Override gateway.port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Mint a token for a user and print its digest for `[auth.provisioned]`
    ProvisionUser {
        username: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate a VAPID key pair
    VapidKeygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Commands::Serve { config, host, port } => {
            let config = Config::load(config.as_deref())?;
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            pushgate::gateway::run_gateway(&host, port, config).await
        }
        Commands::ProvisionUser { username, config } => {
            let config = Config::load(config.as_deref())?;
            provision_user(&config, &username)
        }
        Commands::VapidKeygen => {
            let keys = VapidKeys::generate();
            println!("vapid_public_key = \"{}\"", keys.public_key_base64url());
            println!("vapid_private_key = \"{}\"", keys.private_key_base64url());
            Ok(())
        }
    }
}

/// Print a fresh token and its digest. Output goes to stdout only, never
/// through the logger.
fn provision_user(config: &Config, raw_username: &str) -> Result<()> {
    let username = Username::parse(raw_username)?;
    let hasher = CredentialHasher::new(config.auth.pepper.as_ref().map(Secret::expose))
        .context("Set auth.pepper in config.toml or PUSHGATE_PEPPER")?;

    let token = SessionToken::generate();
    let digest = hasher.hash(token.expose());

    println!("username: {username}");
    println!("token:    {}", token.expose());
    println!();
    println!("Add to config.toml:");
    println!("  [auth.provisioned]");
    println!("  {username} = \"{}\"", digest.expose_hex());
    println!("or export:");
    println!(
        "  PUSHGATE_USER_{}={}",
        username.as_str().to_uppercase(),
        digest.expose_hex()
    );
    println!();
    println!("Hand the token to the user once; it cannot be recovered.");
    Ok(())
}
