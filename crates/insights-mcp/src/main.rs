//! Insights MCP Server - Entry Point

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use insights_mcp::server::McpServer;
use insights_mcp::server::oauth::OAuthState;
use insights_mcp::{Config, InsightsClient, tools};

#[derive(Parser, Debug)]
#[command(name = "insights-mcp")]
#[command(about = "MCP server for Red Hat Insights APIs")]
#[command(version)]
struct Cli {
    /// Comma-separated list of toolsets to serve, or "all"
    #[arg(long, default_value = "all", env = "INSIGHTS_TOOLSET")]
    toolset: String,

    /// Print the tools of every toolset and exit
    #[arg(long)]
    toolset_help: bool,

    /// Only register read-only tools
    #[arg(long)]
    readonly: bool,

    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Externally reachable base URL (e.g. https://mcp.example.com)
    #[arg(long, env = "SELF_URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// Standard input/output (for local MCP hosts)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events
    Http,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

fn print_toolset_help() {
    println!("# All available toolsets");
    for name in tools::TOOLSET_NAMES {
        println!("\n## {name}");
        for tool in tools::register_toolsets(&[(*name).to_string()], false) {
            let mut line = format!("`{}`: {}", tool.name(), tool.description());
            if line.len() > 100 {
                line.truncate(97);
                line.push('…');
            }
            println!("- {line}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if cli.toolset_help {
        print_toolset_help();
        return Ok(());
    }

    init_tracing(&cli.log_level, cli.json_logs);

    let config = Config::from_env()?;
    let toolsets = tools::resolve_toolsets(&cli.toolset);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        toolsets = %toolsets.join(","),
        base_url = %config.base_url,
        "Starting Insights MCP server"
    );

    let client = InsightsClient::new(&config)?;
    let server = McpServer::new(client, &toolsets, cli.readonly);

    match cli.transport {
        Transport::Stdio => {
            if !config.has_service_account() {
                tracing::warn!(
                    "No service-account credentials configured; console API calls will fail"
                );
            }
            server.run_stdio().await?;
        }
        Transport::Http => {
            let oauth = match config.oauth {
                Some(ref oauth_config) => {
                    tracing::info!("OAuth DCR proxy enabled");
                    Some(OAuthState::from_config(&config, oauth_config)?)
                }
                None => None,
            };
            server.run_http(cli.port, cli.base_url, oauth).await?;
        }
    }

    Ok(())
}
