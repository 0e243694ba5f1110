//! Insights MCP Server
//!
//! A Model Context Protocol (MCP) server for the Red Hat Insights console
//! APIs. Exposes inventory, vulnerability, advisor, image-builder,
//! remediation, planning, RBAC, content-sources, and subscription tools to
//! LLM agents, with an OAuth2 dynamic-client-registration proxy that lets
//! MCP clients authenticate end users against Red Hat SSO — an identity
//! provider with no DCR support of its own.
//!
//! # Features
//!
//! - **Nine toolsets** over the console REST APIs, selectable per deployment
//! - **OAuth2 DCR proxy**: PKCE-gated authorization-code flow, single-use
//!   proxy codes, JWT validation against the upstream JWKS
//! - **Async-first**: Tokio, axum, connection-pooled reqwest with retries
//! - **Two transports**: stdio (service-account auth) and HTTP (per-user
//!   bearer auth)
//!
//! # Example
//!
//! ```no_run
//! use insights_mcp::{client::InsightsClient, config::Config, server::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = InsightsClient::new(&config)?;
//!     let toolsets = insights_mcp::tools::resolve_toolsets("all");
//!     let server = McpServer::new(client, &toolsets, false);
//!     server.run_stdio().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod tools;

pub use client::InsightsClient;
pub use config::Config;
pub use error::{ClientError, ToolError};
