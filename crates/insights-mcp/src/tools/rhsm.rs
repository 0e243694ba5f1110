//! Subscription management tools: activation keys and their repositories.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::ToolResult;

const API_PATH: &str = "api/rhsm/v2";

pub const INSTRUCTIONS: &str = "Tools for subscription management: activation keys used to \
register systems, and the repositories available to each key.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetActivationKeysTool),
        Box::new(GetActivationKeyTool),
        Box::new(GetKeyRepositoriesTool),
    ]
}

/// All activation keys.
pub struct GetActivationKeysTool;

#[async_trait::async_trait]
impl McpTool for GetActivationKeysTool {
    fn name(&self) -> &'static str {
        "rhsm_get_activation_keys"
    }

    fn description(&self) -> &'static str {
        "List the activation keys in the account."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let response = ctx.client.get(&format!("{API_PATH}/activation_keys"), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct KeyNameInput {
    name: String,
}

/// One activation key.
pub struct GetActivationKeyTool;

#[async_trait::async_trait]
impl McpTool for GetActivationKeyTool {
    fn name(&self) -> &'static str {
        "rhsm_get_activation_key"
    }

    fn description(&self) -> &'static str {
        "Get one activation key by name: role, usage, service level, and additional \
         repositories."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Activation key name"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: KeyNameInput = serde_json::from_value(input)?;
        let response =
            ctx.client.get(&format!("{API_PATH}/activation_keys/{}", params.name.trim()), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct KeyRepositoriesInput {
    name: String,
    #[serde(default)]
    default: Option<bool>,
}

/// Repositories available to a key.
pub struct GetKeyRepositoriesTool;

#[async_trait::async_trait]
impl McpTool for GetKeyRepositoriesTool {
    fn name(&self) -> &'static str {
        "rhsm_get_activation_key_available_repositories"
    }

    fn description(&self) -> &'static str {
        "List the repositories that systems registered with an activation key can enable."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Activation key name"},
                "default": {
                    "type": "boolean",
                    "description": "Only repositories enabled by default"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: KeyRepositoriesInput = serde_json::from_value(input)?;
        let mut query: Vec<(String, String)> = Vec::new();
        if let Some(default) = params.default {
            query.push(("default".to_string(), default.to_string()));
        }
        let response = ctx
            .client
            .get(
                &format!("{API_PATH}/activation_keys/{}/available_repositories", params.name.trim()),
                &query,
            )
            .await?;
        render(&response)
    }
}
