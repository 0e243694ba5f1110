//! Remediation tools: Ansible playbooks for fixing CVEs on systems.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext, render};
use crate::error::{ToolError, ToolResult};

const API_PATH: &str = "api/remediations/v1";

pub const INSTRUCTIONS: &str = "Tools for remediation playbooks. Created playbooks are visible \
at https://console.redhat.com/insights/remediations/{playbook_id}, but only to the identity \
that created them — return the YAML to the user as-is when asked. Creating playbooks changes \
account state.";

/// Build the toolset.
#[must_use]
pub fn tools() -> Vec<Box<dyn McpTool>> {
    vec![Box::new(ListPlaybooksTool), Box::new(CreateVulnerabilityPlaybookTool)]
}

#[derive(Debug, Deserialize)]
struct ListPlaybooksInput {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Existing remediation playbooks.
pub struct ListPlaybooksTool;

#[async_trait::async_trait]
impl McpTool for ListPlaybooksTool {
    fn name(&self) -> &'static str {
        "remediations_list_playbooks"
    }

    fn description(&self) -> &'static str {
        "List remediation playbooks in the account."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {"type": "string", "description": "Filter by playbook name"},
                "limit": {"type": "integer", "default": 20, "maximum": 100},
                "offset": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: ListPlaybooksInput = serde_json::from_value(input)?;
        let mut query = vec![
            ("limit".to_string(), params.limit.min(100).to_string()),
            ("offset".to_string(), params.offset.to_string()),
        ];
        if let Some(filter) = params.filter.filter(|v| !v.is_empty()) {
            query.push(("filter[name]".to_string(), filter));
        }
        let response = ctx.client.get(&format!("{API_PATH}/remediations"), &query).await?;
        render(&response)
    }
}

#[derive(Debug, Deserialize)]
struct CreatePlaybookInput {
    playbook_name: String,
    cves: Vec<String>,
    uuids: Vec<String>,
}

/// Playbook creation from CVE + system lists (mutating).
///
/// Three console calls: resolve the CVE issues, create the remediation with
/// the chosen resolutions, then fetch the rendered playbook YAML.
pub struct CreateVulnerabilityPlaybookTool;

#[async_trait::async_trait]
impl McpTool for CreateVulnerabilityPlaybookTool {
    fn name(&self) -> &'static str {
        "remediations_create_vulnerability_playbook"
    }

    fn description(&self) -> &'static str {
        "Create an Ansible remediation playbook that fixes the given CVEs on the given systems \
         and return its YAML. You MUST return the YAML as-is, without processing it."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "playbook_name": {
                    "type": "string",
                    "description": "Name of the playbook, e.g. 'Remediation Playbook'"
                },
                "cves": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "CVE identifiers, e.g. ['CVE-2016-0800']"
                },
                "uuids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Inventory UUIDs of the systems to remediate"
                }
            },
            "required": ["playbook_name", "cves", "uuids"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: CreatePlaybookInput = serde_json::from_value(input)?;
        if params.cves.is_empty() {
            return Err(ToolError::validation("cves", "at least one CVE is required"));
        }
        if params.uuids.is_empty() {
            return Err(ToolError::validation("uuids", "at least one system UUID is required"));
        }

        let issues: Vec<String> =
            params.cves.iter().map(|cve| format!("vulnerabilities:{}", cve.to_uppercase())).collect();

        // Step 1: resolve the issues into concrete resolutions.
        let resolutions_in = json!({ "issues": issues });
        let resolutions = ctx.client.post(&format!("{API_PATH}/resolutions"), &resolutions_in).await?;

        let Some(resolution_map) = resolutions.as_object() else {
            return render(&resolutions);
        };
        if !resolution_map.contains_key(&issues[0]) {
            // The API answers 200 with partial content when a CVE has no
            // resolution; surface the body so the agent can explain.
            return render(&resolutions);
        }

        let mut needs_reboot = false;
        let mut add_issues = Vec::new();
        for value in resolution_map.values() {
            let resolution = value
                .get("resolutions")
                .and_then(|r| r.as_array())
                .and_then(|r| r.first())
                .cloned()
                .unwrap_or_else(|| json!({}));
            needs_reboot = needs_reboot
                || resolution.get("needs_reboot").and_then(serde_json::Value::as_bool).unwrap_or(false);
            add_issues.push(json!({
                "id": value.get("id").cloned().unwrap_or_default(),
                "resolution": resolution.get("id").cloned().unwrap_or_default(),
                "systems": params.uuids.clone(),
            }));
        }

        // Suffix the name so repeated runs do not collide.
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name =
            format!("{} mcp-generated-playbook-{}", params.playbook_name, &suffix[..6]);

        // Step 2: create the remediation.
        let remediation_in = json!({
            "name": name,
            "add": { "issues": add_issues },
            "auto_reboot": needs_reboot,
        });
        let remediation = ctx.client.post(&format!("{API_PATH}/remediations"), &remediation_in).await?;

        let Some(id) = remediation.get("id").and_then(|v| v.as_str()) else {
            return render(&remediation);
        };

        // Step 3: fetch the rendered playbook.
        let playbook = ctx.client.get(&format!("{API_PATH}/remediations/{id}/playbook"), &[]).await?;
        match playbook.as_str() {
            Some(yaml) => Ok(yaml.to_string()),
            None => render(&playbook),
        }
    }
}
