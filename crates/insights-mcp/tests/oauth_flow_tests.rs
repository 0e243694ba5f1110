//! End-to-end tests of the OAuth DCR proxy flow.
//!
//! Drives the axum router with a wiremock upstream IdP: discovery →
//! registration → authorize → upstream callback → token exchange, plus the
//! failure paths that matter (single-use codes, PKCE mismatch, expired
//! transactions, missing bearer tokens).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use insights_mcp::client::InsightsClient;
use insights_mcp::config::{Config, OAuthConfig};
use insights_mcp::server::oauth::OAuthState;
use insights_mcp::server::transport::create_router;
use insights_mcp::tools::{self, ToolContext};

const PUBLIC_BASE: &str = "http://localhost:8000";
const CLIENT_REDIRECT: &str = "http://localhost:55454/cb";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Mount a minimal Keycloak-shaped upstream on the mock server.
async fn mount_upstream(mock: &MockServer) {
    let base = mock.uri();
    Mock::given(method("GET"))
        .and(path("/auth/realms/redhat-external/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{base}/auth/realms/redhat-external"),
            "authorization_endpoint": format!("{base}/auth"),
            "token_endpoint": format!("{base}/token"),
            "jwks_uri": format!("{base}/certs"),
            "scopes_supported": ["openid", "api.console", "api.ocm"]
        })))
        .mount(mock)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "upstream-access-token",
            "refresh_token": "upstream-refresh-token",
            "expires_in": 900,
            "token_type": "Bearer",
            "scope": "openid api.console api.ocm"
        })))
        .mount(mock)
        .await;
}

fn build_router(mock_uri: &str, oauth_config: OAuthConfig) -> axum::Router {
    let config = Config::for_testing(mock_uri);
    let oauth = OAuthState::from_config(&config, &oauth_config).unwrap();

    let client = InsightsClient::new(&config).unwrap();
    let ctx = ToolContext::new(Arc::new(client));
    let selected = tools::resolve_toolsets("inventory");
    let registered = tools::register_toolsets(&selected, false);

    create_router(registered, ctx, None, String::new(), Some(oauth))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location(response: &axum::response::Response) -> Url {
    let header = response.headers().get("Location").unwrap().to_str().unwrap();
    Url::parse(header).unwrap()
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

/// Run authorize + callback, returning the proxy code issued to the client.
async fn obtain_proxy_code(app: &axum::Router) -> String {
    let authorize_uri = format!(
        "/authorize?response_type=code&client_id=insights-mcp-test&redirect_uri={CLIENT_REDIRECT}\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=client-xyz&scope=openid"
    );
    let response =
        app.clone().oneshot(Request::get(&authorize_uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let upstream_url = location(&response);
    let upstream_state = query_param(&upstream_url, "state").unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::get(&format!("/oauth/callback?code=abc123&state={upstream_state}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let client_url = location(&response);
    assert!(client_url.as_str().starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&client_url, "state").as_deref(), Some("client-xyz"));
    query_param(&client_url, "code").unwrap()
}

async fn post_token(app: &axum::Router, form: &[(&str, &str)]) -> axum::response::Response {
    let body = serde_urlencoded::to_string(form).unwrap();
    app.clone()
        .oneshot(
            Request::post("/token")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_server_metadata() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(Request::get("/.well-known/oauth-authorization-server").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["issuer"], PUBLIC_BASE);
    assert_eq!(json["authorization_endpoint"], format!("{PUBLIC_BASE}/authorize"));
    assert_eq!(json["token_endpoint"], format!("{PUBLIC_BASE}/token"));
    assert_eq!(json["registration_endpoint"], format!("{PUBLIC_BASE}/register"));
    assert!(json["code_challenge_methods_supported"].as_array().unwrap().contains(&json!("S256")));
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(Request::get("/.well-known/oauth-protected-resource").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["resource"], PUBLIC_BASE);
    assert!(json["authorization_servers"].as_array().unwrap().contains(&json!(PUBLIC_BASE)));
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_returns_shared_client_without_secret() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(
            Request::post("/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "client_name": "Test Client",
                        "redirect_uris": [CLIENT_REDIRECT]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["client_id"], "insights-mcp-test");
    assert_eq!(json["client_name"], "Test Client");
    assert!(json.get("client_secret").is_none());
}

#[tokio::test]
async fn test_register_rejects_unlisted_redirect() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(
            Request::post("/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "redirect_uris": [CLIENT_REDIRECT, "https://attacker.example/cb"]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_request");
}

// ─── Authorization redirect ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authorize_redirects_to_upstream_with_fixed_callback() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let authorize_uri = format!(
        "/authorize?response_type=code&client_id=x&redirect_uri={CLIENT_REDIRECT}\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=s1&scope=openid"
    );
    let response =
        app.oneshot(Request::get(&authorize_uri).body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let upstream_url = location(&response);
    assert!(upstream_url.as_str().starts_with(&format!("{}/auth", mock.uri())));

    // The proxy's fixed callback goes upstream, never the client's URI.
    assert_eq!(
        query_param(&upstream_url, "redirect_uri").as_deref(),
        Some(&*format!("{PUBLIC_BASE}/oauth/callback"))
    );
    // The upstream state is the proxy's own, not the client's.
    let upstream_state = query_param(&upstream_url, "state").unwrap();
    assert_ne!(upstream_state, "s1");
}

#[tokio::test]
async fn test_authorize_rejects_plain_challenge_method() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let authorize_uri = format!(
        "/authorize?response_type=code&redirect_uri={CLIENT_REDIRECT}\
         &code_challenge={CHALLENGE}&code_challenge_method=plain"
    );
    let response =
        app.oneshot(Request::get(&authorize_uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ─── Full flow ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_flow_returns_upstream_bundle() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let proxy_code = obtain_proxy_code(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/token")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(serde_urlencoded::to_string([
                    ("grant_type", "authorization_code"),
                    ("code", proxy_code.as_str()),
                    ("code_verifier", VERIFIER),
                    ("redirect_uri", CLIENT_REDIRECT),
                ]).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("Cache-Control").unwrap().to_str().unwrap(),
        "no-store"
    );
    let json = body_json(response).await;
    assert_eq!(json["access_token"], "upstream-access-token");
    assert_eq!(json["token_type"], "Bearer");
    assert!(json["scope"].as_str().unwrap().contains("openid"));
}

#[tokio::test]
async fn test_proxy_code_is_single_use() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let proxy_code = obtain_proxy_code(&app).await;
    let form = [
        ("grant_type", "authorization_code"),
        ("code", proxy_code.as_str()),
        ("code_verifier", VERIFIER),
    ];

    let first = post_token(&app, &form).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_token(&app, &form).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let json = body_json(second).await;
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_wrong_verifier_fails_as_invalid_grant() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let proxy_code = obtain_proxy_code(&app).await;
    let response = post_token(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", proxy_code.as_str()),
            ("code_verifier", "not-the-original-verifier-not-the-original"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    // PKCE failures surface as invalid_grant on the wire.
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unknown_grant_type_rejected() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = post_token(&app, &[("grant_type", "password")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "unsupported_grant_type");
}

// ─── Expired == absent ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_expired_transaction_indistinguishable_from_unknown() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;

    let mut oauth_config = OAuthConfig::for_testing(PUBLIC_BASE);
    oauth_config.transaction_ttl = Duration::ZERO;
    let app = build_router(&mock.uri(), oauth_config);

    // Start a flow whose transaction expires immediately.
    let authorize_uri = format!(
        "/authorize?response_type=code&redirect_uri={CLIENT_REDIRECT}\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=s1"
    );
    let response =
        app.clone().oneshot(Request::get(&authorize_uri).body(Body::empty()).unwrap()).await.unwrap();
    let upstream_state = query_param(&location(&response), "state").unwrap();

    let expired = app
        .clone()
        .oneshot(
            Request::get(&format!("/oauth/callback?code=abc&state={upstream_state}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let unknown = app
        .clone()
        .oneshot(
            Request::get("/oauth/callback?code=abc&state=never-issued")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(expired.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    let expired_body = body_json(expired).await;
    let unknown_body = body_json(unknown).await;
    assert_eq!(expired_body, unknown_body);
}

// ─── Upstream failure during callback ────────────────────────────────────────

#[tokio::test]
async fn test_upstream_rejection_redirects_with_error() {
    let mock = MockServer::start().await;
    let base = mock.uri();
    Mock::given(method("GET"))
        .and(path("/auth/realms/redhat-external/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/auth"),
            "token_endpoint": format!("{base}/token"),
            "jwks_uri": format!("{base}/certs")
        })))
        .mount(&mock)
        .await;
    // Upstream rejects the code exchange.
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&mock)
        .await;

    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let authorize_uri = format!(
        "/authorize?response_type=code&redirect_uri={CLIENT_REDIRECT}\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=s1"
    );
    let response =
        app.clone().oneshot(Request::get(&authorize_uri).body(Body::empty()).unwrap()).await.unwrap();
    let upstream_state = query_param(&location(&response), "state").unwrap();

    let callback = app
        .clone()
        .oneshot(
            Request::get(&format!("/oauth/callback?code=bad&state={upstream_state}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Failure after the redirect URI is known: error redirect, not HTTP error.
    assert_eq!(callback.status(), StatusCode::FOUND);
    let client_url = location(&callback);
    assert!(client_url.as_str().starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&client_url, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_param(&client_url, "state").as_deref(), Some("s1"));
}

// ─── Bearer gating of MCP routes ─────────────────────────────────────────────

#[tokio::test]
async fn test_mcp_without_bearer_gets_challenge() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(
            Request::post("/mcp")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc":"2.0","method":"tools/list","id":1}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let www_auth = response.headers().get("WWW-Authenticate").unwrap().to_str().unwrap();
    assert!(www_auth.contains("oauth-protected-resource"));
}

#[tokio::test]
async fn test_discovery_not_gated() {
    let mock = MockServer::start().await;
    mount_upstream(&mock).await;
    let app = build_router(&mock.uri(), OAuthConfig::for_testing(PUBLIC_BASE));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
