//! Mock-based tool tests using wiremock.
//!
//! These verify actual tool behavior by mocking the console APIs.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use insights_mcp::client::InsightsClient;
use insights_mcp::config::Config;
use insights_mcp::error::ToolError;
use insights_mcp::tools::{McpTool, ToolContext, advisor, image_builder, inventory, rbac};

/// Create a test context against a mock console.
fn setup_test_context(mock_server: &MockServer) -> ToolContext {
    let config = Config::for_testing(&mock_server.uri());
    let client = InsightsClient::new(&config).unwrap();
    ToolContext::new(Arc::new(client))
}

fn sample_host(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "display_name": name,
        "fqdn": format!("{name}.example.com"),
        "stale_timestamp": "2026-01-01T00:00:00Z",
        "reporter": "puptoo"
    })
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_hosts_defaults() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/inventory/v1/hosts"))
        .and(query_param("per_page", "10"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "count": 2,
            "results": [sample_host("u1", "web01"), sample_host("u2", "db01")]
        })))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = inventory::ListHostsTool;

    let result = tool.execute(&ctx, json!({})).await.unwrap();
    assert!(result.contains("web01"));
    assert!(result.contains("db01"));
}

#[tokio::test]
async fn test_list_hosts_caps_per_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/inventory/v1/hosts"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = inventory::ListHostsTool;

    tool.execute(&ctx, json!({"per_page": 5000})).await.unwrap();
}

#[tokio::test]
async fn test_host_details_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/inventory/v1/hosts/u1,u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [sample_host("u1", "web01")]
        })))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = inventory::GetHostDetailsTool;

    let result = tool.execute(&ctx, json!({"host_ids": "u1,u2"})).await.unwrap();
    assert!(result.contains("web01"));
}

// ─── Advisor ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_active_rules_filters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/insights/v1/rule/"))
        .and(query_param("impacting", "true"))
        .and(query_param("category", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"count": 1},
            "data": [{"rule_id": "grub_pwd|GRUB_PWD", "description": "Bootloader password"}]
        })))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = advisor::GetActiveRulesTool;

    let result = tool.execute(&ctx, json!({"category": "2"})).await.unwrap();
    assert!(result.contains("GRUB_PWD"));
}

#[tokio::test]
async fn test_rule_id_sanitization() {
    let mock_server = MockServer::start().await;
    let ctx = setup_test_context(&mock_server);
    let tool = advisor::GetRuleDetailsTool;

    let err = tool.execute(&ctx, json!({"rule_id": "../../etc/passwd"})).await.unwrap_err();
    assert!(matches!(err, ToolError::Validation { .. }));
}

// ─── Image builder ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_blueprint_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/image-builder/v1/blueprints"))
        .and(body_partial_json(json!({
            "name": "web-image",
            "distribution": "rhel-9"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "3fa85f64-5717-4562-b3fc-2c963f66afa6"
        })))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = image_builder::CreateBlueprintTool;

    let result = tool
        .execute(
            &ctx,
            json!({"name": "web-image", "distribution": "rhel-9", "packages": ["nginx"]}),
        )
        .await
        .unwrap();
    assert!(result.contains("3fa85f64"));
}

#[tokio::test]
async fn test_blueprint_id_must_be_uuid() {
    let mock_server = MockServer::start().await;
    let ctx = setup_test_context(&mock_server);
    let tool = image_builder::GetBlueprintDetailsTool;

    let err = tool.execute(&ctx, json!({"blueprint_id": "not-a-uuid"})).await.unwrap_err();
    assert!(matches!(err, ToolError::Validation { .. }));
}

#[tokio::test]
async fn test_mutating_tools_are_marked() {
    assert!(!image_builder::CreateBlueprintTool.read_only());
    assert!(!image_builder::ComposeBlueprintTool.read_only());
    assert!(image_builder::GetBlueprintsTool.read_only());
}

// ─── RBAC ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_access_defaults_to_all_applications() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/rbac/v1/access/"))
        .and(query_param("application", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"permission": "inventory:hosts:read"}]
        })))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = rbac::GetAccessTool;

    let result = tool.execute(&ctx, json!({})).await.unwrap();
    assert!(result.contains("inventory:hosts:read"));
}

// ─── Error guidance ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_surfaces_setup_guidance() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/inventory/v1/hosts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = inventory::ListHostsTool;

    let err = tool.execute(&ctx, json!({})).await.unwrap_err();
    let message = err.to_user_message();
    assert!(message.contains("service account"));
    assert!(message.contains("console.redhat.com"));
}

#[tokio::test]
async fn test_forbidden_surfaces_rbac_guidance() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/insights/v1/stats/rules/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server);
    let tool = advisor::GetRecommendationsStatsTool;

    let err = tool.execute(&ctx, json!({})).await.unwrap_err();
    assert!(err.to_user_message().contains("RBAC"));
}

// ─── Bearer forwarding ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_context_forwards_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/inventory/v1/hosts"))
        .and(wiremock::matchers::header("Authorization", "Bearer user-token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = setup_test_context(&mock_server).with_bearer("user-token-123");
    let tool = inventory::ListHostsTool;

    tool.execute(&ctx, json!({})).await.unwrap();
}
