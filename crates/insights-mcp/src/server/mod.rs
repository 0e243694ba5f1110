//! MCP server implementation.
//!
//! Provides stdio (for local MCP hosts) and HTTP transports. The HTTP
//! transport can run behind the OAuth DCR proxy ([`oauth`]), in which case
//! every tool call is authenticated against the upstream IdP and executed
//! with the caller's own console identity.

pub mod oauth;
pub mod session;
pub mod stdio;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::InsightsClient;
use crate::tools::{self, McpTool, ToolContext};
use oauth::OAuthState;

/// MCP server for the Insights console APIs.
pub struct McpServer {
    /// Tool execution context.
    ctx: ToolContext,

    /// Registered tools.
    tools: Vec<Box<dyn McpTool>>,

    /// Combined toolset instructions.
    instructions: String,
}

impl McpServer {
    /// Create a server with the selected toolsets.
    #[must_use]
    pub fn new(client: InsightsClient, toolsets: &[String], readonly: bool) -> Self {
        let ctx = ToolContext::new(Arc::new(client));
        let tools = tools::register_toolsets(toolsets, readonly);
        let instructions = tools::instructions(toolsets);

        Self { ctx, tools, instructions }
    }

    /// Run the server in stdio mode.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        tracing::info!("Starting MCP server in stdio mode");
        tracing::info!("Registered {} tools", self.tools.len());

        stdio::run_stdio(self.tools, self.ctx, self.instructions).await
    }

    /// Run the server in HTTP mode, optionally behind the OAuth proxy.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(
        self,
        port: u16,
        base_url: Option<String>,
        oauth: Option<OAuthState>,
    ) -> anyhow::Result<()> {
        tracing::info!(port, oauth = oauth.is_some(), "Starting MCP server in HTTP mode");
        tracing::info!("Registered {} tools", self.tools.len());

        let router =
            transport::create_router(self.tools, self.ctx, base_url, self.instructions, oauth);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Get tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// List all registered tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(&str, &str)> {
        self.tools.iter().map(|t| (t.name(), t.description())).collect()
    }

    /// Get the tool context.
    #[must_use]
    pub const fn context(&self) -> &ToolContext {
        &self.ctx
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.tools.len()).finish()
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install CTRL+C handler");
    tracing::info!("Received shutdown signal");
}
