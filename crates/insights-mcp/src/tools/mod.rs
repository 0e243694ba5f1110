//! MCP tool implementations.
//!
//! One module per console toolset. Each tool:
//! 1. Parses and validates its input parameters
//! 2. Calls the console API through [`InsightsClient`]
//! 3. Returns the API response as JSON text
//!
//! Responses are passed through unmodified: the console APIs already shape
//! their payloads for consumption, and reformatting would only lose fields.

pub mod advisor;
pub mod content_sources;
pub mod image_builder;
pub mod inventory;
pub mod planning;
pub mod rbac;
pub mod remediations;
pub mod rhsm;
pub mod vulnerability;

use std::sync::Arc;

use crate::client::InsightsClient;
use crate::error::ToolResult;

/// Tool execution context.
#[derive(Clone)]
pub struct ToolContext {
    /// Console API client.
    pub client: Arc<InsightsClient>,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(client: Arc<InsightsClient>) -> Self {
        Self { client }
    }

    /// A context whose client forwards the given bearer token. The HTTP
    /// transport builds one per validated request.
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        Self { client: Arc::new(self.client.with_bearer(token)) }
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "inventory_list_hosts").
    fn name(&self) -> &'static str;

    /// Tool description for the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Whether the tool only reads console state. Mutating tools are
    /// dropped in `--readonly` mode.
    fn read_only(&self) -> bool {
        true
    }

    /// Execute the tool with given input.
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String>;
}

/// All toolset names, in registration order.
pub const TOOLSET_NAMES: &[&str] = &[
    "image-builder",
    "rhsm",
    "vulnerability",
    "remediations",
    "advisor",
    "inventory",
    "content-sources",
    "rbac",
    "planning",
];

/// Resolve a `--toolset` argument into a toolset list.
#[must_use]
pub fn resolve_toolsets(arg: &str) -> Vec<String> {
    if arg.trim() == "all" {
        TOOLSET_NAMES.iter().map(ToString::to_string).collect()
    } else {
        arg.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
    }
}

/// Register the tools of the selected toolsets.
#[must_use]
pub fn register_toolsets(selected: &[String], readonly: bool) -> Vec<Box<dyn McpTool>> {
    let mut tools = Vec::new();
    for name in TOOLSET_NAMES {
        if !selected.iter().any(|s| s == name) {
            continue;
        }
        tools.extend(toolset_tools(name));
    }
    if readonly {
        tools.retain(|tool| tool.read_only());
    }
    tools
}

/// Combined server instructions for the selected toolsets.
#[must_use]
pub fn instructions(selected: &[String]) -> String {
    let mut parts = Vec::new();
    for name in TOOLSET_NAMES {
        if !selected.iter().any(|s| s == name) {
            continue;
        }
        let (title, text) = toolset_instructions(name);
        parts.push(format!("## {title}\n\n{text}"));
    }
    parts.join("\n\n")
}

fn toolset_tools(name: &str) -> Vec<Box<dyn McpTool>> {
    match name {
        "image-builder" => image_builder::tools(),
        "rhsm" => rhsm::tools(),
        "vulnerability" => vulnerability::tools(),
        "remediations" => remediations::tools(),
        "advisor" => advisor::tools(),
        "inventory" => inventory::tools(),
        "content-sources" => content_sources::tools(),
        "rbac" => rbac::tools(),
        "planning" => planning::tools(),
        _ => Vec::new(),
    }
}

fn toolset_instructions(name: &str) -> (&'static str, &'static str) {
    match name {
        "image-builder" => ("Insights Image Builder", image_builder::INSTRUCTIONS),
        "rhsm" => ("Subscription Management", rhsm::INSTRUCTIONS),
        "vulnerability" => ("Insights Vulnerability", vulnerability::INSTRUCTIONS),
        "remediations" => ("Insights Remediations", remediations::INSTRUCTIONS),
        "advisor" => ("Insights Advisor", advisor::INSTRUCTIONS),
        "inventory" => ("Insights Inventory", inventory::INSTRUCTIONS),
        "content-sources" => ("Content Sources", content_sources::INSTRUCTIONS),
        "rbac" => ("Role-Based Access Control", rbac::INSTRUCTIONS),
        "planning" => ("RHEL Planning", planning::INSTRUCTIONS),
        _ => ("", ""),
    }
}

/// Render an API response for the MCP text payload.
pub(crate) fn render(value: &serde_json::Value) -> ToolResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_all() {
        let selected = resolve_toolsets("all");
        assert_eq!(selected.len(), TOOLSET_NAMES.len());
    }

    #[test]
    fn test_resolve_list() {
        let selected = resolve_toolsets("inventory, advisor");
        assert_eq!(selected, vec!["inventory".to_string(), "advisor".to_string()]);
    }

    #[test]
    fn test_register_filters_unknown_toolsets() {
        let tools = register_toolsets(&["no-such-toolset".to_string()], false);
        assert!(tools.is_empty());
    }

    #[test]
    fn test_register_all_has_unique_names() {
        let tools = register_toolsets(&resolve_toolsets("all"), false);
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(before, names.len());
        assert!(before > 20);
    }

    #[test]
    fn test_readonly_drops_mutating_tools() {
        let all = register_toolsets(&resolve_toolsets("all"), false);
        let readonly = register_toolsets(&resolve_toolsets("all"), true);
        assert!(readonly.len() < all.len());
        assert!(readonly.iter().all(|t| t.read_only()));
    }

    #[test]
    fn test_instructions_cover_selected_toolsets() {
        let text = instructions(&resolve_toolsets("inventory,advisor"));
        assert!(text.contains("Insights Inventory"));
        assert!(text.contains("Insights Advisor"));
        assert!(!text.contains("Image Builder"));
    }

    #[test]
    fn test_schemas_are_objects() {
        for tool in register_toolsets(&resolve_toolsets("all"), false) {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "schema of {} is not an object", tool.name());
        }
    }
}
