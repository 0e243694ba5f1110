//! Planning tools: roadmap, lifecycle, and app stream data.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::ToolResult;

const API_PATH: &str = "api/roadmap/v1";

pub const INSTRUCTIONS: &str = "Tools for RHEL planning: upcoming changes from the roadmap, \
RHEL major/minor lifecycle dates, and application stream lifecycles. Useful for questions like \
'when does RHEL 9.4 go out of support' or 'which app streams retire next year'.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetUpcomingChangesTool),
        Box::new(GetRhelLifecycleTool),
        Box::new(GetAppStreamsTool),
    ]
}

/// Roadmap feed.
pub struct GetUpcomingChangesTool;

#[async_trait::async_trait]
impl McpTool for GetUpcomingChangesTool {
    fn name(&self) -> &'static str {
        "planning_get_upcoming_changes"
    }

    fn description(&self) -> &'static str {
        "List upcoming RHEL changes from the roadmap: additions, deprecations, and removals."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let response = ctx.client.get(&format!("{API_PATH}/upcoming-changes"), &[]).await?;
        render(&response)
    }
}

/// RHEL lifecycle table.
pub struct GetRhelLifecycleTool;

#[async_trait::async_trait]
impl McpTool for GetRhelLifecycleTool {
    fn name(&self) -> &'static str {
        "planning_get_rhel_lifecycle"
    }

    fn description(&self) -> &'static str {
        "Get RHEL major and minor release lifecycle data: release dates and support phase ends."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let response = ctx.client.get(&format!("{API_PATH}/lifecycle/rhel"), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct AppStreamsInput {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    application_stream_type: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

/// Application stream lifecycles.
pub struct GetAppStreamsTool;

#[async_trait::async_trait]
impl McpTool for GetAppStreamsTool {
    fn name(&self) -> &'static str {
        "planning_get_appstreams"
    }

    fn description(&self) -> &'static str {
        "List application stream lifecycles (e.g. nodejs, postgresql versions per RHEL release)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Filter by stream name, e.g. 'nodejs'"},
                "application_stream_type": {
                    "type": "string",
                    "description": "Filter by stream type"
                },
                "kind": {"type": "string", "description": "Filter by kind ('package' or 'module')"}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: AppStreamsInput = serde_json::from_value(input)?;
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(name) = params.name.filter(|v| !v.is_empty()) {
            query.push(("name".to_string(), name));
        }
        if let Some(stream_type) = params.application_stream_type.filter(|v| !v.is_empty()) {
            query.push(("application_stream_type".to_string(), stream_type));
        }
        if let Some(kind) = params.kind.filter(|v| !v.is_empty()) {
            query.push(("kind".to_string(), kind));
        }
        let response = ctx.client.get(&format!("{API_PATH}/lifecycle/app-streams"), &query).await?;
        render(&response)
    }
}
