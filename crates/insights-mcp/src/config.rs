//! Configuration for the Insights MCP server.

use std::time::Duration;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// Base URL for the Red Hat console APIs.
    pub const INSIGHTS_BASE_URL: &str = "https://console.redhat.com";

    /// Base URL for Red Hat single sign-on.
    pub const SSO_BASE_URL: &str = "https://sso.redhat.com";

    /// Realm path below the SSO base URL.
    pub const SSO_REALM_PATH: &str = "auth/realms/redhat-external";

    /// User-Agent sent on every console API request.
    pub const USER_AGENT: &str = concat!("insights-mcp/", env!("CARGO_PKG_VERSION"));

    /// Request timeout for console API calls.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout for calls to the SSO token and discovery endpoints.
    pub const SSO_TIMEOUT: Duration = Duration::from_secs(30);

    /// Cache TTL for GET responses. Inventory data goes stale quickly, so
    /// this is much shorter than a typical read-through cache.
    pub const CACHE_TTL: Duration = Duration::from_secs(60);

    /// Maximum cached responses.
    pub const CACHE_MAX_SIZE: u64 = 512;

    /// Maximum keepalive connections per host.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);
}

/// OAuth proxy constants.
pub mod oauth {
    use std::time::Duration;

    /// Authorization transactions must complete within this window.
    pub const TRANSACTION_TTL: Duration = Duration::from_secs(600);

    /// Proxy authorization codes are short-lived and single use.
    pub const PROXY_CODE_TTL: Duration = Duration::from_secs(60);

    /// How long a fetched JWKS is served before a background refresh.
    pub const JWKS_TTL: Duration = Duration::from_secs(3600);

    /// Interval of the expired-record sweep.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Scopes a bearer token must carry to call any tool.
    pub const REQUIRED_SCOPES: &[&str] = &["openid", "api.console", "api.ocm"];

    /// Redirect URIs accepted when the operator configures nothing else:
    /// loopback on any port, any path.
    pub const DEFAULT_REDIRECT_PATTERNS: &[&str] =
        &["http://localhost:*", "http://127.0.0.1:*"];
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for console APIs.
    pub base_url: String,

    /// Base URL for the SSO identity provider.
    pub sso_base_url: String,

    /// Service-account client id (stdio deployments).
    pub client_id: Option<String>,

    /// Service-account client secret.
    pub client_secret: Option<String>,

    /// Offline refresh token, used instead of a client secret when set.
    pub refresh_token: Option<String>,

    /// OAuth proxy configuration; `None` disables the proxy entirely.
    pub oauth: Option<OAuthConfig>,

    /// Request timeout for console API calls.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// GET response cache TTL.
    pub cache_ttl: Duration,

    /// Maximum cached responses.
    pub cache_max_size: u64,
}

/// Configuration of the dynamic-client-registration proxy.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// The one upstream client id every dynamic registrant is mapped onto.
    pub sso_client_id: String,

    /// The upstream client secret. Held by the proxy, never returned to
    /// MCP clients.
    pub sso_client_secret: String,

    /// Externally reachable base URL of this server, used for the metadata
    /// document and the fixed upstream callback.
    pub public_base_url: String,

    /// Scopes required on every validated bearer token.
    pub required_scopes: Vec<String>,

    /// Allow-list patterns for client redirect URIs (`*` wildcards).
    pub allowed_redirects: Vec<String>,

    /// Lifetime of an authorization transaction.
    pub transaction_ttl: Duration,

    /// Lifetime of an unused proxy authorization code.
    pub code_ttl: Duration,

    /// Timeout for upstream SSO calls during the flow.
    pub sso_timeout: Duration,
}

impl Config {
    /// Create a configuration with defaults for everything not passed in.
    #[must_use]
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            base_url: api::INSIGHTS_BASE_URL.to_string(),
            sso_base_url: api::SSO_BASE_URL.to_string(),
            client_id,
            client_secret,
            refresh_token,
            oauth: None,
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            cache_ttl: api::CACHE_TTL,
            cache_max_size: api::CACHE_MAX_SIZE,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads the same variables as the Python deployment scripts:
    /// `INSIGHTS_BASE_URL`, `SSO_BASE_URL`, `INSIGHTS_CLIENT_ID`,
    /// `INSIGHTS_CLIENT_SECRET`, `INSIGHTS_REFRESH_TOKEN`, `OAUTH_ENABLED`,
    /// `SSO_CLIENT_ID`, `SSO_CLIENT_SECRET`, `SELF_URL`,
    /// `INSIGHTS_MCP_ALLOWED_REDIRECTS`, `SSO_OAUTH_TIMEOUT_SECONDS`.
    ///
    /// # Errors
    ///
    /// Returns an error when OAuth is enabled but the upstream client
    /// identity is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(
            std::env::var("INSIGHTS_CLIENT_ID").ok(),
            std::env::var("INSIGHTS_CLIENT_SECRET").ok(),
            std::env::var("INSIGHTS_REFRESH_TOKEN").ok(),
        );

        if let Ok(url) = std::env::var("INSIGHTS_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var("SSO_BASE_URL") {
            config.sso_base_url = url;
        }

        let oauth_enabled = std::env::var("OAUTH_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if oauth_enabled {
            let sso_client_id = std::env::var("SSO_CLIENT_ID")
                .map_err(|_| anyhow::anyhow!("OAUTH_ENABLED requires SSO_CLIENT_ID"))?;
            let sso_client_secret = std::env::var("SSO_CLIENT_SECRET")
                .map_err(|_| anyhow::anyhow!("OAUTH_ENABLED requires SSO_CLIENT_SECRET"))?;
            let public_base_url = std::env::var("SELF_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string());

            let allowed_redirects = std::env::var("INSIGHTS_MCP_ALLOWED_REDIRECTS")
                .map(|v| v.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_else(|_| {
                    oauth::DEFAULT_REDIRECT_PATTERNS.iter().map(ToString::to_string).collect()
                });

            let sso_timeout = std::env::var("SSO_OAUTH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(api::SSO_TIMEOUT, Duration::from_secs);

            config.oauth = Some(OAuthConfig {
                sso_client_id,
                sso_client_secret,
                public_base_url,
                required_scopes: oauth::REQUIRED_SCOPES.iter().map(ToString::to_string).collect(),
                allowed_redirects,
                transaction_ttl: oauth::TRANSACTION_TTL,
                code_ttl: oauth::PROXY_CODE_TTL,
                sso_timeout,
            });
        }

        Ok(config)
    }

    /// Create a test configuration pointing all endpoints at a mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            sso_base_url: base_url.to_string(),
            client_id: None,
            client_secret: None,
            refresh_token: None,
            oauth: None,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(0), // No caching in tests
            cache_max_size: 0,
        }
    }

    /// OIDC discovery document URL for the configured SSO realm.
    #[must_use]
    pub fn sso_config_url(&self) -> String {
        format!(
            "{}/{}/.well-known/openid-configuration",
            self.sso_base_url.trim_end_matches('/'),
            api::SSO_REALM_PATH
        )
    }

    /// Token endpoint of the configured SSO realm.
    ///
    /// Used directly by the service-account flow; the OAuth proxy prefers
    /// the endpoint advertised by the discovery document.
    #[must_use]
    pub fn sso_token_endpoint(&self) -> String {
        format!(
            "{}/{}/protocol/openid-connect/token",
            self.sso_base_url.trim_end_matches('/'),
            api::SSO_REALM_PATH
        )
    }

    /// Check if service-account credentials are configured.
    #[must_use]
    pub fn has_service_account(&self) -> bool {
        self.client_id.is_some() && (self.client_secret.is_some() || self.refresh_token.is_some())
    }
}

impl OAuthConfig {
    /// OAuth configuration for tests: mock SSO, instant-expiry knobs left at
    /// their defaults unless a test overrides them.
    #[must_use]
    pub fn for_testing(public_base_url: &str) -> Self {
        Self {
            sso_client_id: "insights-mcp-test".to_string(),
            sso_client_secret: "test-secret".to_string(),
            public_base_url: public_base_url.to_string(),
            required_scopes: oauth::REQUIRED_SCOPES.iter().map(ToString::to_string).collect(),
            allowed_redirects: oauth::DEFAULT_REDIRECT_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            transaction_ttl: oauth::TRANSACTION_TTL,
            code_ttl: oauth::PROXY_CODE_TTL,
            sso_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.base_url, api::INSIGHTS_BASE_URL);
        assert!(config.oauth.is_none());
        assert!(!config.has_service_account());
    }

    #[test]
    fn test_service_account_detection() {
        let config =
            Config::new(Some("svc".to_string()), Some("secret".to_string()), None);
        assert!(config.has_service_account());

        let config = Config::new(Some("svc".to_string()), None, None);
        assert!(!config.has_service_account());

        let config =
            Config::new(Some("svc".to_string()), None, Some("offline-token".to_string()));
        assert!(config.has_service_account());
    }

    #[test]
    fn test_derived_sso_urls() {
        let config = Config::default();
        assert_eq!(
            config.sso_config_url(),
            "https://sso.redhat.com/auth/realms/redhat-external/.well-known/openid-configuration"
        );
        assert_eq!(
            config.sso_token_endpoint(),
            "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_trailing_slash_in_sso_base() {
        let mut config = Config::default();
        config.sso_base_url = "https://sso.example.com/".to_string();
        assert!(!config.sso_config_url().contains("com//"));
    }

    #[test]
    fn test_oauth_testing_defaults() {
        let oauth = OAuthConfig::for_testing("http://localhost:8000");
        assert!(oauth.required_scopes.contains(&"openid".to_string()));
        assert!(oauth.allowed_redirects.iter().any(|p| p.contains("localhost")));
    }
}
