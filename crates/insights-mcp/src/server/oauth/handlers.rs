//! OAuth 2.0 endpoint handlers for MCP authentication.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration (facade over one upstream client)
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant, proxied to the upstream IdP

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::error::AuthError;
use super::proxy::AuthorizeParams;
use super::types::TokenBundle;
use crate::server::transport::HttpState;

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };
    let base = &oauth.proxy.config().public_base_url;

    Json(serde_json::json!({
        "resource": base,
        "authorization_servers": [base],
        "bearer_methods_supported": ["header"],
        "scopes_supported": oauth.proxy.config().required_scopes,
    }))
    .into_response()
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
///
/// Describes the proxy's endpoints and capabilities. The registration
/// endpoint is the proxy's own — the upstream IdP has no DCR support, which
/// is the entire reason this facade exists.
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };
    let base = oauth.proxy.config().public_base_url.trim_end_matches('/');

    Json(serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "scopes_supported": oauth.proxy.config().required_scopes,
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256"]
    }))
    .into_response()
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
}

/// `POST /register`
///
/// Every registrant receives the shared upstream client id; no secret is
/// ever returned because none exists for public MCP clients.
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    let redirect_uris = req.redirect_uris.unwrap_or_default();
    let identity = match oauth.proxy.register(&redirect_uris) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    tracing::info!(client_name = ?req.client_name, "Registered OAuth client");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": identity.client_id(),
            "client_name": req.client_name,
            "redirect_uris": redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none"
        })),
    )
        .into_response()
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

/// `GET /authorize`
///
/// Validates the request and redirects to the upstream IdP. There is no
/// interactive page on the proxy: the upstream login IS the consent step.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    if query.response_type.as_deref() != Some("code") {
        return AuthError::InvalidRequest("response_type must be 'code'".to_string())
            .into_response();
    }
    let Some(redirect_uri) = query.redirect_uri else {
        return AuthError::InvalidRequest("redirect_uri is required".to_string()).into_response();
    };
    let Some(code_challenge) = query.code_challenge else {
        return AuthError::InvalidRequest("code_challenge is required".to_string()).into_response();
    };

    let params = AuthorizeParams {
        redirect_uri,
        code_challenge,
        code_challenge_method: query.code_challenge_method.unwrap_or_default(),
        state: query.state,
        scope: query.scope,
    };

    match oauth.proxy.start_authorization(params).await {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(e) => e.into_response(),
    }
}

// ─── Upstream Callback ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    #[allow(dead_code)]
    pub error_description: Option<String>,
}

/// `GET /oauth/callback`
///
/// The fixed redirect URI registered with the upstream IdP. Relays the
/// outcome to the original MCP client.
pub async fn handle_callback(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    let Some(ref upstream_state) = query.state else {
        return AuthError::InvalidRequest("state is required".to_string()).into_response();
    };

    match oauth
        .proxy
        .handle_upstream_callback(upstream_state, query.code.as_deref(), query.error.as_deref())
        .await
    {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(e) => e.into_response(),
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    #[allow(dead_code)]
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
}

/// `POST /token`
///
/// Exchange a proxy authorization code for the upstream token bundle, or
/// forward a refresh grant.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    axum::Form(form): axum::Form<TokenRequest>,
) -> Response {
    let Some(ref oauth) = state.oauth else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    match form.grant_type.as_str() {
        "authorization_code" => {
            let Some(ref code) = form.code else {
                return AuthError::InvalidRequest("code is required".to_string()).into_response();
            };
            let Some(ref verifier) = form.code_verifier else {
                return AuthError::InvalidRequest("code_verifier is required".to_string())
                    .into_response();
            };
            match oauth.proxy.exchange_code(code, verifier, form.redirect_uri.as_deref()).await {
                Ok(bundle) => token_success(&bundle),
                Err(e) => e.into_response(),
            }
        }
        "refresh_token" => {
            let Some(ref refresh_token) = form.refresh_token else {
                return AuthError::InvalidRequest("refresh_token is required".to_string())
                    .into_response();
            };
            match oauth.proxy.refresh(refresh_token).await {
                Ok(bundle) => token_success(&bundle),
                Err(e) => e.into_response(),
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "unsupported_grant_type"
            })),
        )
            .into_response(),
    }
}

/// Build a token response with the required cache headers (RFC 6749 §5.1).
fn token_success(bundle: &TokenBundle) -> Response {
    let mut response = Json(serde_json::json!({
        "access_token": bundle.access_token,
        "token_type": "Bearer",
        "expires_in": bundle.expires_in,
        "refresh_token": bundle.refresh_token,
        "scope": bundle.scope
    }))
    .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
