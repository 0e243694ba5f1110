//! Content sources tools: custom repository management.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::ToolResult;

const API_PATH: &str = "api/content-sources/v1.0";

pub const INSTRUCTIONS: &str = "Tools for content sources: the custom and Red Hat repositories \
configured in the account, as used by image builder and system content management.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![Box::new(ListRepositoriesTool), Box::new(GetRepositoryPackagesTool)]
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
struct ListRepositoriesInput {
    #[serde(default)]
    search: Option<String>,
    /// "custom" or "red_hat".
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Repository listing.
pub struct ListRepositoriesTool;

#[async_trait::async_trait]
impl McpTool for ListRepositoriesTool {
    fn name(&self) -> &'static str {
        "content_sources_list_repositories"
    }

    fn description(&self) -> &'static str {
        "List repositories configured in the account, with search and origin/arch/version \
         filters."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "search": {"type": "string", "description": "Search in repository name and URL"},
                "origin": {"type": "string", "enum": ["custom", "red_hat"]},
                "arch": {"type": "string", "description": "Filter by architecture, e.g. 'x86_64'"},
                "version": {"type": "string", "description": "Filter by RHEL version, e.g. '9'"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListRepositoriesInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(search) = params.search.filter(|v| !v.is_empty()) {
            query.push(("search".to_string(), search));
        }
        if let Some(origin) = params.origin.filter(|v| !v.is_empty()) {
            query.push(("origin".to_string(), origin));
        }
        if let Some(arch) = params.arch.filter(|v| !v.is_empty()) {
            query.push(("arch".to_string(), arch));
        }
        if let Some(version) = params.version.filter(|v| !v.is_empty()) {
            query.push(("version".to_string(), version));
        }
        let response = ctx.client.get(&format!("{API_PATH}/repositories/"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryPackagesInput {
    repository_uuid: String,
    #[serde(default)]
    search: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

/// Packages within one repository.
pub struct GetRepositoryPackagesTool;

#[async_trait::async_trait]
impl McpTool for GetRepositoryPackagesTool {
    fn name(&self) -> &'static str {
        "content_sources_get_repository_packages"
    }

    fn description(&self) -> &'static str {
        "List the RPM packages of a repository."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "repository_uuid": {"type": "string", "description": "Repository UUID"},
                "search": {"type": "string", "description": "Filter by package name"},
                "limit": {"type": "integer", "default": 20, "maximum": 100}
            },
            "required": ["repository_uuid"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: RepositoryPackagesInput = serde_json::from_value(input)?;
        let mut query = vec![("limit".to_string(), params.limit.min(100).to_string())];
        if let Some(search) = params.search.filter(|v| !v.is_empty()) {
            query.push(("search".to_string(), search));
        }
        let response = ctx
            .client
            .get(
                &format!("{API_PATH}/repositories/{}/rpms", params.repository_uuid.trim()),
                &query,
            )
            .await?;
        render(&response)
    }
}
