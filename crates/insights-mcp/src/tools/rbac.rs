//! RBAC tools: access queries, roles, groups, principals.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::ToolResult;

const API_PATH: &str = "api/rbac/v1";

pub const INSTRUCTIONS: &str = "Tools for role-based access control: the caller's permissions, \
roles and their definitions, groups, and principals in the account. Use these to diagnose \
'missing permission' failures reported by other toolsets.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetAccessTool),
        Box::new(GetRolesTool),
        Box::new(GetRoleDetailsTool),
        Box::new(GetGroupsTool),
        Box::new(GetPrincipalsTool),
    ]
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
struct GetAccessInput {
    /// Application to query, e.g. "inventory" or "advisor"; "*" for all.
    #[serde(default)]
    application: Option<String>,
}

/// Permissions of the current identity.
pub struct GetAccessTool;

#[async_trait::async_trait]
impl McpTool for GetAccessTool {
    fn name(&self) -> &'static str {
        "rbac_get_access"
    }

    fn description(&self) -> &'static str {
        "Get the permissions of the current identity for an application (or all applications)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "application": {
                    "type": "string",
                    "description": "Application name, e.g. 'inventory'; omit for all"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetAccessInput = serde_json::from_value(input)?;
        let application = params.application.filter(|v| !v.is_empty()).unwrap_or_else(|| "*".to_string());
        let query = vec![("application".to_string(), application)];
        let response = ctx.client.get(&format!("{API_PATH}/access/"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct GetRolesInput {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Role listing.
pub struct GetRolesTool;

#[async_trait::async_trait]
impl McpTool for GetRolesTool {
    fn name(&self) -> &'static str {
        "rbac_get_roles"
    }

    fn description(&self) -> &'static str {
        "List RBAC roles in the account, optionally filtered by name."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Filter by role name"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetRolesInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(name) = params.name.filter(|v| !v.is_empty()) {
            query.push(("name".to_string(), name));
        }
        let response = ctx.client.get(&format!("{API_PATH}/roles/"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct RoleUuidInput {
    role_uuid: String,
}

/// One role with its permission list.
pub struct GetRoleDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetRoleDetailsTool {
    fn name(&self) -> &'static str {
        "rbac_get_role_details"
    }

    fn description(&self) -> &'static str {
        "Get the definition of a role, including its access/permission list."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "role_uuid": {"type": "string", "description": "Role UUID"}
            },
            "required": ["role_uuid"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: RoleUuidInput = serde_json::from_value(input)?;
        let response =
            ctx.client.get(&format!("{API_PATH}/roles/{}/", params.role_uuid.trim()), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct GetGroupsInput {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Group listing.
pub struct GetGroupsTool;

#[async_trait::async_trait]
impl McpTool for GetGroupsTool {
    fn name(&self) -> &'static str {
        "rbac_get_groups"
    }

    fn description(&self) -> &'static str {
        "List RBAC groups in the account."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Filter by group name"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetGroupsInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(name) = params.name.filter(|v| !v.is_empty()) {
            query.push(("name".to_string(), name));
        }
        let response = ctx.client.get(&format!("{API_PATH}/groups/"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct GetPrincipalsInput {
    #[serde(default)]
    usernames: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Principal listing.
pub struct GetPrincipalsTool;

#[async_trait::async_trait]
impl McpTool for GetPrincipalsTool {
    fn name(&self) -> &'static str {
        "rbac_get_principals"
    }

    fn description(&self) -> &'static str {
        "List principals (users) in the account."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "usernames": {
                    "type": "string",
                    "description": "Comma-separated usernames to look up"
                },
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetPrincipalsInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(usernames) = params.usernames.filter(|v| !v.is_empty()) {
            query.push(("usernames".to_string(), usernames));
        }
        let response = ctx.client.get(&format!("{API_PATH}/principals/"), &query).await?;
        render(&response)
    }
}
