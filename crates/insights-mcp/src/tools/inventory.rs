//! Host inventory tools: hosts, system profiles, tags.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::ToolResult;

const API_PATH: &str = "api/inventory/v1";

pub const INSTRUCTIONS: &str = "Tools for host inventory data of systems connected to Insights: \
connected systems, their operating systems, installed packages, and tags. Requires at least the \
'Inventory Hosts viewer' RBAC role.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(ListHostsTool),
        Box::new(GetHostDetailsTool),
        Box::new(GetHostSystemProfileTool),
        Box::new(GetHostTagsTool),
        Box::new(FindHostByNameTool),
    ]
}

fn default_per_page() -> u32 {
    10
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ListHostsInput {
    #[serde(default)]
    hostname_or_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    staleness: Option<String>,
    #[serde(default)]
    registered_with: Option<String>,
    #[serde(default)]
    updated_start: Option<String>,
    #[serde(default)]
    updated_end: Option<String>,
    #[serde(default = "default_per_page")]
    per_page: u32,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    order_how: Option<String>,
}

/// List hosts with filtering and sorting.
pub struct ListHostsTool;

#[async_trait::async_trait]
impl McpTool for ListHostsTool {
    fn name(&self) -> &'static str {
        "inventory_list_hosts"
    }

    fn description(&self) -> &'static str {
        "List hosts with filtering and sorting options. CRITICAL: keep per_page at the default \
         of 10 on the first call to avoid context overflow; only increase it when the user \
         explicitly asks to see more systems at once."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hostname_or_id": {
                    "type": "string",
                    "description": "Filter by display_name, fqdn, or id (case-insensitive)"
                },
                "display_name": {"type": "string", "description": "Filter by display name"},
                "fqdn": {"type": "string", "description": "Filter by FQDN"},
                "tags": {
                    "type": "string",
                    "description": "Filter by tags, e.g. 'ns1/key1=val1,ns2/key2=val2'"
                },
                "staleness": {
                    "type": "string",
                    "description": "One of 'fresh', 'stale', 'stale_warning', 'unknown'"
                },
                "registered_with": {
                    "type": "string",
                    "description": "Filter by the reporter that registered the host"
                },
                "updated_start": {
                    "type": "string",
                    "description": "Hosts updated after this RFC3339 timestamp"
                },
                "updated_end": {
                    "type": "string",
                    "description": "Hosts updated before this RFC3339 timestamp"
                },
                "per_page": {"type": "integer", "default": 10, "maximum": 100},
                "page": {"type": "integer", "default": 1},
                "order_by": {
                    "type": "string",
                    "description": "Sort field: 'display_name', 'updated', or 'created'"
                },
                "order_how": {"type": "string", "enum": ["ASC", "DESC"], "default": "ASC"}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListHostsInput = serde_json::from_value(input)?;

        let mut query: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                query.push((key.to_string(), value));
            }
        };
        push("hostname_or_id", params.hostname_or_id);
        push("display_name", params.display_name);
        push("fqdn", params.fqdn);
        push("tags", params.tags);
        push("staleness", params.staleness);
        push("registered_with", params.registered_with);
        push("updated_start", params.updated_start);
        push("updated_end", params.updated_end);
        if let Some(order_by) = params.order_by.filter(|v| !v.is_empty()) {
            query.push(("order_by".to_string(), order_by));
            query.push((
                "order_how".to_string(),
                params.order_how.unwrap_or_else(|| "ASC".to_string()),
            ));
        }
        query.push(("per_page".to_string(), params.per_page.min(100).to_string()));
        query.push(("page".to_string(), params.page.to_string()));

        let response = ctx.client.get(&format!("{API_PATH}/hosts"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct HostIdsInput {
    host_ids: String,
}

/// Detailed host records by id.
pub struct GetHostDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetHostDetailsTool {
    fn name(&self) -> &'static str {
        "inventory_get_host_details"
    }

    fn description(&self) -> &'static str {
        "Get detailed information for specific hosts: identifiers, display names, network info, \
         cloud provider details, timestamps, reporter info, groups, and facts."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "host_ids": {
                    "type": "string",
                    "description": "Comma-separated list of host IDs (UUIDs)"
                }
            },
            "required": ["host_ids"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: HostIdsInput = serde_json::from_value(input)?;
        let response =
            ctx.client.get(&format!("{API_PATH}/hosts/{}", params.host_ids), &[]).await?;
        render(&response)
    }
}

/// Hardware and software configuration per host.
pub struct GetHostSystemProfileTool;

#[async_trait::async_trait]
impl McpTool for GetHostSystemProfileTool {
    fn name(&self) -> &'static str {
        "inventory_get_host_system_profile"
    }

    fn description(&self) -> &'static str {
        "Get detailed system profile information for specific hosts: CPU, memory, network \
         interfaces, disks, BIOS, enabled repositories, installed packages, and services. \
         Responses are large; supply one or two UUIDs at a time."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "host_ids": {
                    "type": "string",
                    "description": "Comma-separated host IDs (UUIDs); one or two at a time"
                }
            },
            "required": ["host_ids"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: HostIdsInput = serde_json::from_value(input)?;
        let response = ctx
            .client
            .get(&format!("{API_PATH}/hosts/{}/system_profile", params.host_ids), &[])
            .await?;
        render(&response)
    }
}

/// Tags attached to hosts.
pub struct GetHostTagsTool;

#[async_trait::async_trait]
impl McpTool for GetHostTagsTool {
    fn name(&self) -> &'static str {
        "inventory_get_host_tags"
    }

    fn description(&self) -> &'static str {
        "Get tags for specific hosts."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "host_ids": {
                    "type": "string",
                    "description": "Comma-separated list of host IDs (UUIDs)"
                }
            },
            "required": ["host_ids"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: HostIdsInput = serde_json::from_value(input)?;
        let response =
            ctx.client.get(&format!("{API_PATH}/hosts/{}/tags", params.host_ids), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct FindHostInput {
    hostname: String,
}

/// Single-host lookup by name.
pub struct FindHostByNameTool;

#[async_trait::async_trait]
impl McpTool for FindHostByNameTool {
    fn name(&self) -> &'static str {
        "inventory_find_host_by_name"
    }

    fn description(&self) -> &'static str {
        "Find a host by its hostname or display name."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hostname": {
                    "type": "string",
                    "description": "The hostname or display name to search for"
                }
            },
            "required": ["hostname"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: FindHostInput = serde_json::from_value(input)?;
        let query = vec![
            ("hostname_or_id".to_string(), params.hostname),
            ("per_page".to_string(), "1".to_string()),
        ];
        let response = ctx.client.get(&format!("{API_PATH}/hosts"), &query).await?;
        render(&response)
    }
}
