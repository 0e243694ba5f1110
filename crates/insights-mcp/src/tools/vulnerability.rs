//! Vulnerability tools: CVEs and the systems they affect.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::{ToolError, ToolResult};

const API_PATH: &str = "api/vulnerability/v1";

pub const INSTRUCTIONS: &str = "Tools for vulnerability data: CVEs affecting the account's \
systems, per-CVE details, and affected-system lists. CVE identifiers use the canonical \
'CVE-YYYY-NNNN' form. Requires the 'Vulnerability viewer' RBAC role.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(GetCvesTool),
        Box::new(GetCveDetailsTool),
        Box::new(GetAffectedSystemsTool),
        Box::new(GetVulnerableSystemsTool),
    ]
}

fn sanitize_cve(cve: &str) -> ToolResult<String> {
    let upper = cve.trim().to_uppercase();
    let ok = upper.starts_with("CVE-")
        && upper.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(upper)
    } else {
        Err(ToolError::validation("cve_id", "expected the form CVE-YYYY-NNNN"))
    }
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
struct GetCvesInput {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    cvss_from: Option<f64>,
    #[serde(default)]
    business_risk_id: Option<String>,
    #[serde(default)]
    known_exploit: Option<bool>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// CVE list for the account.
pub struct GetCvesTool;

#[async_trait::async_trait]
impl McpTool for GetCvesTool {
    fn name(&self) -> &'static str {
        "vulnerability_get_cves"
    }

    fn description(&self) -> &'static str {
        "List CVEs affecting systems in the account, with optional text, CVSS score, business \
         risk, and known-exploit filters."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {"type": "string", "description": "Free-text filter on CVE id and description"},
                "cvss_from": {"type": "number", "description": "Minimum CVSS base score"},
                "business_risk_id": {"type": "string", "description": "Business risk id filter"},
                "known_exploit": {"type": "boolean", "description": "Only CVEs with known exploits"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetCvesInput = serde_json::from_value(input)?;

        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(filter) = params.filter.filter(|v| !v.is_empty()) {
            query.push(("filter".to_string(), filter));
        }
        if let Some(cvss_from) = params.cvss_from {
            query.push(("cvss_from".to_string(), cvss_from.to_string()));
        }
        if let Some(risk) = params.business_risk_id.filter(|v| !v.is_empty()) {
            query.push(("business_risk_id".to_string(), risk));
        }
        if params.known_exploit == Some(true) {
            query.push(("known_exploit".to_string(), "true".to_string()));
        }

        let response =
            ctx.client.get(&format!("{API_PATH}/vulnerabilities/cves"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct CveIdInput {
    cve_id: String,
}

/// Detail record for one CVE.
pub struct GetCveDetailsTool;

#[async_trait::async_trait]
impl McpTool for GetCveDetailsTool {
    fn name(&self) -> &'static str {
        "vulnerability_get_cve_details"
    }

    fn description(&self) -> &'static str {
        "Get details of a CVE as it applies to the account: description, CVSS scores, affected \
         package lists, and remediation state."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "cve_id": {"type": "string", "description": "CVE identifier, e.g. 'CVE-2016-0800'"}
            },
            "required": ["cve_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CveIdInput = serde_json::from_value(input)?;
        let cve = sanitize_cve(&params.cve_id)?;
        let response = ctx.client.get(&format!("{API_PATH}/cves/{cve}"), &[]).await?;
        render(&response)
    }
}

/// Systems affected by one CVE.
pub struct GetAffectedSystemsTool;

#[async_trait::async_trait]
impl McpTool for GetAffectedSystemsTool {
    fn name(&self) -> &'static str {
        "vulnerability_get_systems_affected_by_cve"
    }

    fn description(&self) -> &'static str {
        "List the systems affected by a CVE, including their inventory UUIDs for use with \
         remediation tools."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "cve_id": {"type": "string", "description": "CVE identifier"}
            },
            "required": ["cve_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CveIdInput = serde_json::from_value(input)?;
        let cve = sanitize_cve(&params.cve_id)?;
        let response =
            ctx.client.get(&format!("{API_PATH}/cves/{cve}/affected_systems"), &[]).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct VulnerableSystemsInput {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Per-system vulnerability exposure.
pub struct GetVulnerableSystemsTool;

#[async_trait::async_trait]
impl McpTool for GetVulnerableSystemsTool {
    fn name(&self) -> &'static str {
        "vulnerability_get_systems"
    }

    fn description(&self) -> &'static str {
        "List systems with their CVE exposure counts, most exposed first."
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
        let params: VulnerableSystemsInput = serde_json::from_value(input)?;
        let query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
            ("sort".to_string(), "-cve_count".to_string()),
        ];
        let response = ctx.client.get(&format!("{API_PATH}/systems"), &query).await?;
        render(&response)
    }
}
