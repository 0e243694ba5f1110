//! Red Hat console API client.
//!
//! Provides an async HTTP client with:
//! - Connection pooling via reqwest
//! - Retry middleware with exponential backoff for transient failures
//! - Short-TTL response caching for GETs
//! - Three authentication modes: none, service account, forwarded bearer

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{Config, api};
use crate::error::{ClientError, ClientResult};
use auth::ServiceAccountAuth;

/// Guidance returned on 403 responses; written for an LLM agent to relay.
const NO_RBAC_GUIDANCE: &str = "[INSTRUCTION] Tell the user that they don't have sufficient \
    permissions! The user should go to \
    [https://console.redhat.com/iam/user-access/overview](https://console.redhat.com/iam/user-access/overview) \
    to check their RBAC permissions and roles. They may need to request additional access or have \
    an administrator grant the necessary permissions. The user is authenticated but lacks the \
    required permissions for this resource. Describe this for the user without exposing tool \
    internals, and do not proceed with the request before it is fixed.";

/// How the client authenticates against console.redhat.com.
#[derive(Clone)]
enum AuthMode {
    /// Unauthenticated (only useful against mocks and public endpoints).
    None,
    /// Service account / offline token via the SSO token endpoint.
    ServiceAccount(Arc<ServiceAccountAuth>),
    /// A validated end-user bearer token, forwarded verbatim.
    Bearer(String),
}

/// Console API client.
#[derive(Clone)]
pub struct InsightsClient {
    /// HTTP client with retry middleware.
    client: ClientWithMiddleware,

    /// Response cache, shared across clones.
    cache: Cache<String, serde_json::Value>,

    /// Console base URL.
    base_url: String,

    auth: AuthMode,
}

impl InsightsClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            api::USER_AGENT.parse().expect("valid user-agent header"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("valid content-type header"),
        );

        let base = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(api::MAX_KEEPALIVE)
            .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(30))
            .build_with_max_retries(3);

        let client = ClientBuilder::new(base.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let cache = Cache::builder()
            .max_capacity(config.cache_max_size)
            .time_to_live(config.cache_ttl.max(Duration::from_millis(1)))
            .build();

        let auth = if config.has_service_account() {
            AuthMode::ServiceAccount(Arc::new(ServiceAccountAuth::new(
                base,
                config.sso_token_endpoint(),
                config.client_id.clone().unwrap_or_default(),
                config.client_secret.clone(),
                config.refresh_token.clone(),
            )))
        } else {
            AuthMode::None
        };

        Ok(Self { client, cache, base_url: config.base_url.trim_end_matches('/').to_string(), auth })
    }

    /// A clone of this client that authenticates with the caller's bearer
    /// token. Used by the HTTP transport to forward each validated request
    /// identity to the console APIs; pool and cache are shared.
    #[must_use]
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut client = self.clone();
        client.auth = AuthMode::Bearer(token.to_string());
        client
    }

    /// Check whether the client can authenticate at all.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self.auth, AuthMode::None)
    }

    /// GET an API endpoint. `path` is relative to the console base URL,
    /// e.g. `api/inventory/v1/hosts`.
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure.
    pub async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ClientResult<serde_json::Value> {
        let cache_key = self.cache_key("GET", path, params);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let mut request = self.client.get(self.url(path));
        if !params.is_empty() {
            request = request.query(params);
        }
        let request = self.authorize(request).await?;

        let response = request.send().await?;
        let value = self.handle_response(response).await?;

        self.cache.insert(cache_key, value.clone()).await;
        Ok(value)
    }

    /// POST a JSON body to an API endpoint.
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure.
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> ClientResult<serde_json::Value> {
        let request = self.client.post(self.url(path)).json(body);
        let request = self.authorize(request).await?;
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// PUT a JSON body to an API endpoint.
    ///
    /// # Errors
    ///
    /// Returns error on transport or API failure.
    pub async fn put(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> ClientResult<serde_json::Value> {
        let request = self.client.put(self.url(path)).json(body);
        let request = self.authorize(request).await?;
        let response = request.send().await?;
        self.handle_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach credentials according to the auth mode.
    async fn authorize(
        &self,
        request: reqwest_middleware::RequestBuilder,
    ) -> ClientResult<reqwest_middleware::RequestBuilder> {
        match &self.auth {
            AuthMode::None => Ok(request),
            AuthMode::Bearer(token) => Ok(request.bearer_auth(token)),
            AuthMode::ServiceAccount(source) => {
                let token = source.access_token().await?;
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// Map API response status codes onto the error taxonomy.
    async fn handle_response(&self, response: reqwest::Response) -> ClientResult<serde_json::Value> {
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(ClientError::from);
        }

        match status.as_u16() {
            401 => Err(ClientError::unauthorized(auth::NO_AUTH_GUIDANCE)),
            403 => Err(ClientError::forbidden(NO_RBAC_GUIDANCE)),
            404 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::not_found(text))
            }
            400 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::bad_request(text))
            }
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(ClientError::rate_limited(retry_after))
            }
            500..=599 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::server(status.as_u16(), text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::UnexpectedStatus { status: status.as_u16(), message: text })
            }
        }
    }

    /// Cache key over method, path, query, and identity. The cache is
    /// shared across per-request clones, so the caller's identity must be
    /// part of the key — one user's responses never answer another's.
    fn cache_key(&self, method: &str, path: &str, params: &[(String, String)]) -> String {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(self.base_url.as_bytes());
        hasher.update(b"|");
        match &self.auth {
            AuthMode::None => {}
            AuthMode::ServiceAccount(_) => hasher.update(b"service-account"),
            AuthMode::Bearer(token) => hasher.update(token.as_bytes()),
        }
        hasher.update(b"|");
        hasher.update(path.as_bytes());
        hasher.update(b"|");

        for (k, v) in params {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }

        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for InsightsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.auth {
            AuthMode::None => "none",
            AuthMode::ServiceAccount(_) => "service_account",
            AuthMode::Bearer(_) => "bearer",
        };
        f.debug_struct("InsightsClient")
            .field("base_url", &self.base_url)
            .field("auth", &mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let client = InsightsClient::new(&Config::for_testing("http://mock.local")).unwrap();
        assert_eq!(client.url("api/inventory/v1/hosts"), "http://mock.local/api/inventory/v1/hosts");
        assert_eq!(client.url("/api/rbac/v1/access/"), "http://mock.local/api/rbac/v1/access/");
    }

    #[test]
    fn test_bearer_clone_switches_mode() {
        let client = InsightsClient::new(&Config::for_testing("http://mock.local")).unwrap();
        assert!(!client.is_authenticated());

        let bearer = client.with_bearer("abc123");
        assert!(bearer.is_authenticated());
        // The original client is untouched.
        assert!(!client.is_authenticated());
    }

    #[test]
    fn test_cache_key_varies_with_identity() {
        let client = InsightsClient::new(&Config::for_testing("http://mock.local")).unwrap();
        let anon = client.cache_key("GET", "api/x", &[]);
        let user_a = client.with_bearer("user-a").cache_key("GET", "api/x", &[]);
        let user_b = client.with_bearer("user-b").cache_key("GET", "api/x", &[]);
        assert_ne!(anon, user_a);
        assert_ne!(user_a, user_b);
    }

    #[test]
    fn test_cache_key_varies_with_params() {
        let client = InsightsClient::new(&Config::for_testing("http://mock.local")).unwrap();
        let a = client.cache_key("GET", "api/x", &[("page".to_string(), "1".to_string())]);
        let b = client.cache_key("GET", "api/x", &[("page".to_string(), "2".to_string())]);
        assert_ne!(a, b);
    }
}
