//! Image builder tools: distributions, blueprints, composes.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::{ToolError, ToolResult};

const API_PATH: &str = "api/image-builder/v1";

pub const INSTRUCTIONS: &str = "Tools for building RHEL images: list supported distributions, \
manage blueprints, and trigger or inspect composes. Blueprint and compose identifiers are \
UUIDs. Creating, updating, and composing blueprints changes account state.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetDistributionsTool),
        Box::new(GetBlueprintsTool),
        Box::new(GetBlueprintDetailsTool),
        Box::new(CreateBlueprintTool),
        Box::new(ComposeBlueprintTool),
        Box::new(GetComposesTool),
        Box::new(GetComposeDetailsTool),
    ]
}

fn default_limit() -> u32 {
    20
}

fn sanitize_uuid(field: &'static str, value: &str) -> ToolResult<String> {
    uuid::Uuid::parse_str(value.trim())
        .map(|u| u.to_string())
        .map_err(|_| ToolError::validation(field, "expected a UUID"))
}

/// Supported distributions.
pub struct GetDistributionsTool;

#[async_trait::async_trait]
impl McpTool for GetDistributionsTool {
    fn name(&self) -> &'static str {
        "image_builder_get_distributions"
    }

    fn description(&self) -> &'static str {
        "List the distributions images can be built for (e.g. rhel-9, rhel-10)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let response = ctx.client.get(&format!("{API_PATH}/distributions"), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct GetBlueprintsInput {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Blueprint listing.
pub struct GetBlueprintsTool;

#[async_trait::async_trait]
impl McpTool for GetBlueprintsTool {
    fn name(&self) -> &'static str {
        "image_builder_get_blueprints"
    }

    fn description(&self) -> &'static str {
        "List image blueprints in the account, newest first."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Filter by blueprint name"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetBlueprintsInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(name) = params.name.filter(|v| !v.is_empty()) {
            query.push(("name".to_string(), name));
        }
        let response = ctx.client.get(&format!("{API_PATH}/blueprints"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct BlueprintIdInput {
    blueprint_id: String,
}

/// One blueprint, fully expanded.
pub struct GetBlueprintDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetBlueprintDetailsTool {
    fn name(&self) -> &'static str {
        "image_builder_get_blueprint_details"
    }

    fn description(&self) -> &'static str {
        "Get the full definition of a blueprint: distribution, customizations, and requested \
         image types."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "blueprint_id": {"type": "string", "description": "Blueprint UUID"}
            },
            "required": ["blueprint_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: BlueprintIdInput = serde_json::from_value(input)?;
        let id = sanitize_uuid("blueprint_id", &params.blueprint_id)?;
        let response = ctx.client.get(&format!("{API_PATH}/blueprints/{id}"), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct CreateBlueprintInput {
    name: String,
    distribution: String,
    #[serde(default)]
    description: Option<String>,
    /// Image request architecture, e.g. "x86_64".
    #[serde(default)]
    architecture: Option<String>,
    /// Image type, e.g. "guest-image", "aws", "image-installer".
    #[serde(default)]
    image_type: Option<String>,
    /// Extra packages to install.
    #[serde(default)]
    packages: Vec<String>,
}

/// Blueprint creation (mutating).
pub struct CreateBlueprintTool;

#[async_trait::async_trait]
impl McpTool for CreateBlueprintTool {
    fn name(&self) -> &'static str {
        "image_builder_create_blueprint"
    }

    fn description(&self) -> &'static str {
        "Create a new image blueprint. Confirm the distribution, architecture, and image type \
         with the user before calling this."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Blueprint name"},
                "distribution": {"type": "string", "description": "Target distribution, e.g. 'rhel-9'"},
                "description": {"type": "string"},
                "architecture": {"type": "string", "default": "x86_64"},
                "image_type": {"type": "string", "default": "guest-image"},
                "packages": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Additional packages to install"
                }
            },
            "required": ["name", "distribution"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreateBlueprintInput = serde_json::from_value(input)?;
        if params.name.trim().is_empty() {
            return Err(ToolError::validation("name", "must not be empty"));
        }

        let body = json!({
            "name": params.name,
            "description": params.description.unwrap_or_default(),
            "distribution": params.distribution,
            "image_requests": [{
                "architecture": params.architecture.unwrap_or_else(|| "x86_64".to_string()),
                "image_type": params.image_type.unwrap_or_else(|| "guest-image".to_string()),
                "upload_request": {"type": "aws.s3", "options": {}}
            }],
            "customizations": {
                "packages": params.packages
            }
        });

        let response = ctx.client.post(&format!("{API_PATH}/blueprints"), &body).await?;
        render(&response)
    }
}

/// Compose trigger (mutating).
pub struct ComposeBlueprintTool;

#[async_trait::async_trait]
impl McpTool for ComposeBlueprintTool {
    fn name(&self) -> &'static str {
        "image_builder_blueprint_compose"
    }

    fn description(&self) -> &'static str {
        "Start building the images of a blueprint. Building takes a while; follow up with \
         image_builder_get_composes to watch progress."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "blueprint_id": {"type": "string", "description": "Blueprint UUID"}
            },
            "required": ["blueprint_id"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: BlueprintIdInput = serde_json::from_value(input)?;
        let id = sanitize_uuid("blueprint_id", &params.blueprint_id)?;
        let response =
            ctx.client.post(&format!("{API_PATH}/blueprints/{id}/compose"), &json!({})).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct GetComposesInput {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Compose listing.
pub struct GetComposesTool;

#[async_trait::async_trait]
impl McpTool for GetComposesTool {
    fn name(&self) -> &'static str {
        "image_builder_get_composes"
    }

    fn description(&self) -> &'static str {
        "List image composes and their status, newest first."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetComposesInput = serde_json::from_value(input)?;
        let query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        let response = ctx.client.get(&format!("{API_PATH}/composes"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct ComposeIdInput {
    compose_id: String,
}

/// One compose, including upload status.
pub struct GetComposeDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetComposeDetailsTool {
    fn name(&self) -> &'static str {
        "image_builder_get_compose_details"
    }

    fn description(&self) -> &'static str {
        "Get the status and result of a compose, including image download details once finished."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "compose_id": {"type": "string", "description": "Compose UUID"}
            },
            "required": ["compose_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ComposeIdInput = serde_json::from_value(input)?;
        let id = sanitize_uuid("compose_id", &params.compose_id)?;
        let response = ctx.client.get(&format!("{API_PATH}/composes/{id}"), &[]).await?;
        render(&response)
    }
}
