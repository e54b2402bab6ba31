//! Xero MCP Server - Entry Point
//!
//! Provides stdio and HTTP transports, plus a `login` command that runs the
//! browser authorization flow once and stores the resulting tokens.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use xero_mcp::auth::{Authenticator, CredentialStrategy, FileTokenStore, IdentityClient, TokenStore};
use xero_mcp::config::{AuthMode, Config};
use xero_mcp::server::McpServer;
use xero_mcp::XeroClient;

#[derive(Parser, Debug)]
#[command(name = "xero-mcp")]
#[command(about = "MCP server for the Xero accounting API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio", env = "MCP_TRANSPORT")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value = "8080", env = "PORT")]
    port: u16,

    /// HTTP bind address
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Public base URL for endpoint announcements and OAuth metadata
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the MCP server (default)
    Serve,
    /// Authorize in the browser and store tokens for refreshable mode
    Login,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// Standard input/output
    #[default]
    Stdio,
    /// Streamable HTTP plus legacy SSE
    Http,
}

/// Logs always go to stderr; in stdio mode stdout carries JSON-RPC.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli, &config).await,
        Command::Login => login(&config).await,
    }
}

async fn serve(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        auth_mode = config.auth_mode().map_or("none", AuthMode::as_str),
        "Starting Xero MCP server"
    );

    let auth = Arc::new(Authenticator::from_config(config)?);
    let client = XeroClient::new(config, auth)?;
    let server = McpServer::new(client);

    match cli.transport {
        Transport::Stdio => server.run_stdio().await,
        Transport::Http => {
            tracing::info!(port = cli.port, base_url = ?cli.base_url, "Running in HTTP mode");
            server.run_http(config, &cli.host, cli.port, cli.base_url.clone()).await
        }
    }
}

async fn login(config: &Config) -> anyhow::Result<()> {
    let strategy = CredentialStrategy::for_mode(AuthMode::Interactive, config)?;
    let identity = IdentityClient::new(config)?;
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_file));
    let auth = Authenticator::new(strategy, identity, store, config);

    eprintln!("Opening the Xero login page; waiting for the callback on {}", config.redirect_uri);
    let connections = auth.login().await?;

    println!("Tokens saved to {}", config.token_file.display());
    println!("Connected organisations:");
    for (i, connection) in connections.iter().enumerate() {
        let marker = if i == 0 { " (active)" } else { "" };
        println!(
            "  {} - {}{}",
            connection.tenant_name.as_deref().unwrap_or("Unnamed"),
            connection.tenant_id,
            marker
        );
    }
    println!("Set XERO_OAUTH_MODE=true to use these tokens when serving.");

    Ok(())
}
