//! MCP Session Server — entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use mcp_units::UnitKind;

use mcp_session_server::config::{RateLimitConfig, ServerConfig};
use mcp_session_server::types::{ServerCapabilities, MCP_VERSION, SERVER_NAME, SERVER_VERSION};
use mcp_session_server::{default_registry, Engine, EngineOptions, HttpTransport, StdioTransport};

#[derive(Parser)]
#[command(
    name = "mcp-session-server",
    about = "Session-scoped MCP server over streamable HTTP",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Start MCP server over HTTP.
    ServeHttp {
        /// Listen host. Also reads MCP_HOST.
        #[arg(long)]
        host: Option<String>,

        /// Listen port. Also reads MCP_PORT.
        #[arg(long)]
        port: Option<u16>,

        /// Endpoint path. Also reads MCP_PATH.
        #[arg(long)]
        path: Option<String>,

        /// Bearer token for authentication.
        /// Also reads from AGENTIC_TOKEN or MCP_AUTH_TOKEN.
        #[arg(long)]
        token: Option<String>,

        /// Serve every POST on a fresh engine; no session ids.
        #[arg(long)]
        stateless: bool,

        /// Enable CORS, exposing the session-id header.
        #[arg(long)]
        cors: bool,

        /// Allowed CORS origin (default: any).
        #[arg(long)]
        cors_origin: Option<String>,

        /// Per-IP sustained requests per second; enables rate limiting.
        #[arg(long)]
        rate_limit_rps: Option<f64>,

        /// Per-IP burst size.
        #[arg(long)]
        rate_limit_burst: Option<f64>,
    },

    /// Print server capabilities and unit inventory as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   mcp-session-server completions bash > ~/.local/share/bash-completion/completions/mcp-session-server
    ///   mcp-session-server completions zsh > ~/.zfunc/_mcp-session-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let engine = Engine::from_registry(EngineOptions::default(), &default_registry());
            let transport = StdioTransport::new(engine);
            transport.run().await?;
        }

        Commands::ServeHttp {
            host,
            port,
            path,
            token,
            stateless,
            cors,
            cors_origin,
            rate_limit_rps,
            rate_limit_burst,
        } => {
            // CLI flag > env var > default
            let mut config = ServerConfig::from_env()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(path) = path {
                config.path = path;
            }
            if token.is_some() {
                config.auth_token = token;
            }
            if stateless {
                config.session_management_enabled = false;
            }
            if cors {
                config.cors_enabled = true;
            }
            if cors_origin.is_some() {
                config.cors_origin = cors_origin;
            }
            if rate_limit_rps.is_some() || rate_limit_burst.is_some() {
                let base = config.rate_limit.unwrap_or_default();
                config.rate_limit = Some(RateLimitConfig {
                    rps: rate_limit_rps.unwrap_or(base.rps),
                    burst: rate_limit_burst.unwrap_or(base.burst),
                });
            }
            config.validate()?;

            tracing::info!("MCP session server v{SERVER_VERSION}");
            if config.auth_token.is_some() {
                tracing::info!("Auth: bearer token required");
            }
            if let Some(limit) = &config.rate_limit {
                tracing::info!("Rate limit: {} rps, burst {}", limit.rps, limit.burst);
            }

            let registry = Arc::new(default_registry());
            let transport = HttpTransport::new(config, registry, EngineOptions::default());
            transport.run().await?;
        }

        Commands::Info => {
            let registry = default_registry();
            let names = |kind| -> Vec<String> {
                registry
                    .list_units(kind)
                    .iter()
                    .map(|r| r.name.clone())
                    .collect()
            };
            let info = serde_json::json!({
                "server": { "name": SERVER_NAME, "version": SERVER_VERSION },
                "protocol_version": MCP_VERSION,
                "capabilities": ServerCapabilities::for_registry(&registry),
                "tools": names(UnitKind::Action),
                "resources": names(UnitKind::Datasource),
                "prompts": names(UnitKind::Template),
                "unit_count": registry.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "mcp-session-server",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
