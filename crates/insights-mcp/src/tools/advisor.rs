//! Advisor tools: recommendation rules and the systems hitting them.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::{ToolError, ToolResult};

const API_PATH: &str = "api/insights/v1";

pub const INSTRUCTIONS: &str = "Tools for Insights Advisor recommendations (rules): active rules \
for the account, rule details, and which systems are hitting a rule. Rule identifiers look like \
'insights_rule|ERROR_KEY'. Requires the 'Advisor viewer' RBAC role.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetActiveRulesTool),
        Box::new(GetRuleDetailsTool),
        Box::new(GetHostsHittingRuleTool),
        Box::new(GetRecommendationsStatsTool),
    ]
}

/// Rule ids contain a pipe; anything else suspicious is rejected before it
/// reaches a URL path segment.
fn sanitize_rule_id(rule_id: &str) -> ToolResult<String> {
    let ok = !rule_id.is_empty()
        && rule_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '|' | '.' | '_' | '-'));
    if ok {
        Ok(rule_id.to_string())
    } else {
        Err(ToolError::validation("rule_id", "contains unexpected characters"))
    }
}

#[derive(Debug, Deserialize)]
struct ActiveRulesInput {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    likelihood: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Active recommendation rules.
pub struct GetActiveRulesTool;

#[async_trait::async_trait]
impl McpTool for GetActiveRulesTool {
    fn name(&self) -> &'static str {
        "advisor_get_active_rules"
    }

    fn description(&self) -> &'static str {
        "List active Advisor recommendation rules for the account, with optional category, \
         impact, likelihood, and free-text filters."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "Category id filter (1=Availability, 2=Security, 3=Stability, 4=Performance)"
                },
                "impact": {"type": "string", "description": "Impact level 1-4"},
                "likelihood": {"type": "string", "description": "Likelihood level 1-4"},
                "text": {"type": "string", "description": "Free-text search in rule title and summary"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ActiveRulesInput = serde_json::from_value(input)?;

        let mut query = vec![
            ("impacting".to_string(), "true".to_string()),
            ("rule_status".to_string(), "enabled".to_string()),
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(category) = params.category.filter(|v| !v.is_empty()) {
            query.push(("category".to_string(), category));
        }
        if let Some(impact) = params.impact.filter(|v| !v.is_empty()) {
            query.push(("impact".to_string(), impact));
        }
        if let Some(likelihood) = params.likelihood.filter(|v| !v.is_empty()) {
            query.push(("likelihood".to_string(), likelihood));
        }
        if let Some(text) = params.text.filter(|v| !v.is_empty()) {
            query.push(("text".to_string(), text));
        }

        let response = ctx.client.get(&format!("{API_PATH}/rule/"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct RuleIdInput {
    rule_id: String,
}

/// Full detail for one rule.
pub struct GetRuleDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetRuleDetailsTool {
    fn name(&self) -> &'static str {
        "advisor_get_rule_details"
    }

    fn description(&self) -> &'static str {
        "Get full details of a recommendation rule: description, rationale, resolution, and \
         impacted-system count."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "rule_id": {
                    "type": "string",
                    "description": "Rule id, e.g. 'hardening_grub_pwd|HARDENING_GRUB_PWD'"
                }
            },
            "required": ["rule_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: RuleIdInput = serde_json::from_value(input)?;
        let rule_id = sanitize_rule_id(&params.rule_id)?;
        let response = ctx.client.get(&format!("{API_PATH}/rule/{rule_id}/"), &[]).await?;
        render(&response)
    }
}

/// Systems currently hitting a rule.
pub struct GetHostsHittingRuleTool;

#[async_trait::async_trait]
impl McpTool for GetHostsHittingRuleTool {
    fn name(&self) -> &'static str {
        "advisor_get_hosts_hitting_a_rule"
    }

    fn description(&self) -> &'static str {
        "List the systems currently affected by a recommendation rule."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "rule_id": {"type": "string", "description": "Rule id"}
            },
            "required": ["rule_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: RuleIdInput = serde_json::from_value(input)?;
        let rule_id = sanitize_rule_id(&params.rule_id)?;
        let response = ctx.client.get(&format!("{API_PATH}/rule/{rule_id}/systems/"), &[]).await?;
        render(&response)
    }
}

/// Account-wide recommendation statistics.
pub struct GetRecommendationsStatsTool;

#[async_trait::async_trait]
impl McpTool for GetRecommendationsStatsTool {
    fn name(&self) -> &'static str {
        "advisor_get_recommendations_statistics"
    }

    fn description(&self) -> &'static str {
        "Get statistics over active recommendations: counts by category and by total risk."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> ToolResult<String> {
        let response = ctx.client.get(&format!("{API_PATH}/stats/rules/"), &[]).await?;
        render(&response)
    }
}
