//! HTTP transport for the MCP server.
//!
//! Streamable HTTP (`/mcp`) plus the legacy SSE transport, with session
//! mailboxes and Last-Event-ID replay. When OAuth is enabled the router
//! additionally serves the DCR-proxy endpoints, and every MCP request must
//! carry a bearer token that survives the validator; the validated token is
//! forwarded to the console APIs for that request.

use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Extension, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::{self, OAuthState, Principal};
use super::session::SessionManager;
use crate::tools::{McpTool, ToolContext};

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }
}

/// MCP tool info for tools/list responses.
#[derive(Debug, Serialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub tools: Vec<Box<dyn McpTool>>,
    pub ctx: ToolContext,
    pub sessions: Arc<SessionManager>,
    /// Base URL for endpoint announcements.
    pub base_url: String,
    /// Combined toolset instructions for the initialize response.
    pub instructions: String,
    /// DCR proxy + validator; `None` runs the transport open.
    pub oauth: Option<OAuthState>,
}

/// Create the HTTP router.
pub fn create_router(
    tools: Vec<Box<dyn McpTool>>,
    ctx: ToolContext,
    base_url: Option<String>,
    instructions: String,
    oauth: Option<OAuthState>,
) -> Router {
    let sessions = Arc::new(SessionManager::new());
    Arc::clone(&sessions).start_cleanup_task();

    let base_url = base_url
        .or_else(|| oauth.as_ref().map(|o| o.proxy.config().public_base_url.clone()))
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    let state = Arc::new(HttpState { tools, ctx, sessions, base_url, instructions, oauth });

    let mcp_routes = Router::new()
        .route("/mcp", post(handle_mcp_post).get(handle_mcp_get))
        .route("/sse", get(handle_sse_legacy))
        .route("/message", post(handle_message_post))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    let mut router = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .merge(mcp_routes);

    if state.oauth.is_some() {
        router = router
            .route(
                "/.well-known/oauth-protected-resource",
                get(oauth::handlers::handle_protected_resource),
            )
            .route(
                "/.well-known/oauth-authorization-server",
                get(oauth::handlers::handle_auth_server_metadata),
            )
            .route("/register", post(oauth::handlers::handle_register))
            .route("/authorize", get(oauth::handlers::handle_authorize))
            .route("/oauth/callback", get(oauth::handlers::handle_callback))
            .route("/token", post(oauth::handlers::handle_token));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Auth middleware ─────────────────────────────────────────────────────────

/// Gate MCP requests on a validated bearer token when OAuth is enabled.
///
/// A missing or invalid token answers 401 with `WWW-Authenticate` pointing
/// at the protected-resource metadata, which is what triggers an MCP
/// client's OAuth discovery.
async fn require_bearer(
    State(state): State<Arc<HttpState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(ref oauth) = state.oauth else {
        return next.run(request).await;
    };

    let Some(TypedHeader(authorization)) = bearer else {
        return challenge_response(&state, StatusCode::UNAUTHORIZED, "invalid_request");
    };

    match oauth.validator.validate(authorization.token()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected bearer token");
            challenge_response(&state, e.status(), e.oauth_code())
        }
    }
}

fn challenge_response(state: &HttpState, status: StatusCode, error: &str) -> Response {
    let resource_url = format!("{}/.well-known/oauth-protected-resource", state.base_url);
    let mut response = (
        status,
        Json(serde_json::json!({
            "error": error,
        })),
    )
        .into_response();
    let challenge = format!("Bearer resource_metadata=\"{resource_url}\", error=\"{error}\"");
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert("WWW-Authenticate", value);
    }
    response
}

// ─── Health ──────────────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "insights-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let session_count = state.sessions.session_count().await;
    Json(serde_json::json!({
        "status": "ready",
        "service": "insights-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": session_count,
        "tools": state.tools.len(),
        "oauth": state.oauth.is_some(),
    }))
}

// ─── Streamable HTTP transport ───────────────────────────────────────────────

/// Handle POST requests to /mcp.
async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SessionQuery>,
    principal: Option<Extension<Principal>>,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    tracing::debug!(method = %req.method, "Handling MCP POST request");

    let session = state.sessions.get_or_create(query.session_id.as_deref()).await;
    let is_notification = req.id.is_none();

    let response = match req.method.as_str() {
        "initialize" => {
            let result = initialize_result(&state, &req.params);
            let mut response = Json(JsonRpcResponse::success(req.id, result)).into_response();
            response.headers_mut().insert("Mcp-Session-Id", session.id_header());
            return response;
        }
        "notifications/initialized" | "initialized" | "notifications/cancelled" => {
            if is_notification {
                return StatusCode::ACCEPTED.into_response();
            }
            JsonRpcResponse::success(req.id, serde_json::json!({}))
        }
        "tools/list" => tools_list_response(req.id, &state.tools),
        "tools/call" => {
            let principal = principal.map(|Extension(p)| p);
            let tool_response =
                handle_tools_call(req.id.clone(), &req.params, &state, principal.as_ref()).await;

            // Push tool results into the session buffer for replay.
            if let Some(ref result) = tool_response.result {
                let event_data = serde_json::to_string(&JsonRpcResponse::success(
                    req.id.clone(),
                    result.clone(),
                ))
                .unwrap_or_default();
                session.push_event("message", event_data).await;
            }

            tool_response
        }
        "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
        _ => {
            if is_notification {
                return StatusCode::ACCEPTED.into_response();
            }
            JsonRpcResponse::error(req.id, -32601, format!("Method not found: {}", req.method))
        }
    };

    let mut res = Json(response).into_response();
    res.headers_mut().insert("Mcp-Session-Id", session.id_header());
    res
}

/// Legacy /message endpoint, same semantics as /mcp POST.
async fn handle_message_post(
    state: State<Arc<HttpState>>,
    query: Query<SessionQuery>,
    principal: Option<Extension<Principal>>,
    req: Json<JsonRpcRequest>,
) -> Response {
    handle_mcp_post(state, query, principal, req).await
}

/// Handle GET requests to /mcp (SSE stream for server-initiated messages).
async fn handle_mcp_get(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let last_event_id = parse_last_event_id(&headers);
    let session = state.sessions.get_or_create(query.session_id.as_deref()).await;

    tracing::info!(session_id = %session.id, last_event_id, "New SSE stream connection");

    let stream = build_sse_stream(session, last_event_id).await;

    (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
}

/// Legacy SSE endpoint: announces the /message endpoint first.
async fn handle_sse_legacy(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let last_event_id = parse_last_event_id(&headers);
    let session = state.sessions.create_session().await;

    tracing::info!(session_id = %session.id, last_event_id, "New legacy SSE connection");

    let endpoint_url = format!("{}/message?sessionId={}", state.base_url, session.id);
    let endpoint_data = serde_json::json!({ "endpoint": endpoint_url });
    session.push_event("endpoint", endpoint_data.to_string()).await;

    let stream = build_sse_stream(session, last_event_id).await;

    (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
            ("Connection", "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
}

fn parse_last_event_id(headers: &HeaderMap) -> u64 {
    headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Replay missed events, then stream live ones.
async fn build_sse_stream(
    session: Arc<super::session::Session>,
    last_event_id: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let missed = session.events_after(last_event_id).await;
    let replay_stream = stream::iter(missed.into_iter().map(|e| {
        tracing::debug!(event_id = e.id, "Replaying missed event");
        Ok::<_, Infallible>(e.to_sse_event())
    }));

    let receiver = session.subscribe();
    let live_stream = BroadcastStream::new(receiver).filter_map(
        |result: Result<super::session::BufferedEvent, _>| async move {
            match result {
                Ok(event) => Some(Ok(event.to_sse_event())),
                Err(e) => {
                    tracing::debug!(error = %e, "Broadcast lag, client will catch up");
                    None
                }
            }
        },
    );

    replay_stream.chain(live_stream)
}

// ─── MCP methods ─────────────────────────────────────────────────────────────

pub(crate) fn initialize_result(state: &HttpState, params: &serde_json::Value) -> serde_json::Value {
    let protocol_version =
        params.get("protocolVersion").and_then(|v| v.as_str()).unwrap_or("2024-11-05");

    tracing::info!("MCP initialize: protocol version {}", protocol_version);

    let mut result = serde_json::json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": "insights-mcp",
            "version": env!("CARGO_PKG_VERSION")
        }
    });
    if !state.instructions.is_empty() {
        result["instructions"] = serde_json::Value::String(state.instructions.clone());
    }
    result
}

pub(crate) fn tools_list_response(
    id: Option<serde_json::Value>,
    tools: &[Box<dyn McpTool>],
) -> JsonRpcResponse {
    let tool_list: Vec<McpToolInfo> = tools
        .iter()
        .map(|t| McpToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect();

    JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_list }))
}

async fn handle_tools_call(
    id: Option<serde_json::Value>,
    params: &serde_json::Value,
    state: &HttpState,
    principal: Option<&Principal>,
) -> JsonRpcResponse {
    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, -32602, "Missing 'name' parameter");
    };

    let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

    let Some(tool) = state.tools.iter().find(|t| t.name() == tool_name) else {
        return JsonRpcResponse::error(id, -32602, format!("Tool not found: {tool_name}"));
    };

    // In OAuth mode each request runs with the caller's own console
    // identity; otherwise the shared (service-account) client is used.
    let ctx = match principal {
        Some(principal) => state.ctx.with_bearer(&principal.token),
        None => state.ctx.clone(),
    };

    tracing::info!(tool = %tool_name, subject = ?principal.map(|p| p.subject.as_str()), "Executing tool");

    match tool.execute(&ctx, arguments).await {
        Ok(result) => JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": result
                }]
            }),
        ),
        Err(e) => {
            tracing::error!(tool = %tool_name, error = %e, "Tool execution failed");
            JsonRpcResponse::error(id, -32000, e.to_user_message())
        }
    }
}
