//! Service-account authentication for the console APIs.
//!
//! Stdio deployments have no end-user OAuth flow; they authenticate with a
//! service account (client_credentials grant) or an offline refresh token
//! against the SSO token endpoint. Tokens are cached in-process and
//! replaced shortly before expiry.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{ClientError, ClientResult};

/// Replace the cached token this long before it actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Guidance returned when no credentials are configured or they are
/// rejected; written for an LLM agent to relay verbatim.
pub const NO_AUTH_GUIDANCE: &str = "[INSTRUCTION] Tell the user that the MCP server setup is not \
    valid! The user should go to [https://console.redhat.com](https://console.redhat.com) to \
    'YOUR USER' ➡ My User Access ➡ Service Accounts, create a service account, and then set \
    INSIGHTS_CLIENT_ID and INSIGHTS_CLIENT_SECRET in the MCP server configuration. Direct link \
    for the user's convenience: \
    [https://console.redhat.com/iam/service-accounts](https://console.redhat.com/iam/service-accounts). \
    Describe this for the user without exposing tool internals, and do not proceed with the \
    request before it is fixed.";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct CachedToken {
    access_token: String,
    fetched_at: Instant,
    lifetime: Duration,
}

impl CachedToken {
    fn is_usable(&self) -> bool {
        self.fetched_at.elapsed() + EXPIRY_MARGIN < self.lifetime
    }
}

/// Token source for a service account or offline refresh token.
pub struct ServiceAccountAuth {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Option<String>,
    /// Offline token; rotated when the endpoint returns a fresh one.
    refresh_token: RwLock<Option<String>>,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Build a token source. Exactly one of `client_secret` and
    /// `refresh_token` must be present; the caller has checked that.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        token_endpoint: String,
        client_id: String,
        client_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint,
            client_id,
            client_secret,
            refresh_token: RwLock::new(refresh_token),
            cached: RwLock::new(None),
        }
    }

    /// A valid access token, fetched or refreshed as needed.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unauthorized`] with setup guidance when the grant is
    /// rejected; transport errors pass through.
    pub async fn access_token(&self) -> ClientResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.is_usable() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let token = self.fetch_token().await?;
        Ok(token)
    }

    async fn fetch_token(&self) -> ClientResult<String> {
        let refresh = self.refresh_token.read().await.clone();

        let mut form: Vec<(&str, String)> = vec![("client_id", self.client_id.clone())];
        if let Some(ref token) = refresh {
            form.push(("grant_type", "refresh_token".to_string()));
            form.push(("refresh_token", token.clone()));
        } else if let Some(ref secret) = self.client_secret {
            form.push(("grant_type", "client_credentials".to_string()));
            form.push(("client_secret", secret.clone()));
        } else {
            return Err(ClientError::unauthorized(NO_AUTH_GUIDANCE));
        }

        tracing::debug!(endpoint = %self.token_endpoint, "Fetching service-account token");

        let response = self.http.post(&self.token_endpoint).form(&form).send().await?;
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "SSO rejected service-account grant");
            return Err(ClientError::unauthorized(NO_AUTH_GUIDANCE));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::server(status.as_u16(), body));
        }

        let token: TokenResponse =
            response.json::<TokenResponse>().await.map_err(ClientError::from)?;

        // Keycloak rotates offline tokens; keep the newest.
        if let Some(new_refresh) = token.refresh_token {
            *self.refresh_token.write().await = Some(new_refresh);
        }

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300));
        *self.cached.write().await = Some(CachedToken {
            access_token: token.access_token.clone(),
            fetched_at: Instant::now(),
            lifetime,
        });

        Ok(token.access_token)
    }
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth").field("client_id", &self.client_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_margin() {
        let token = CachedToken {
            access_token: "t".to_string(),
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(900),
        };
        assert!(token.is_usable());

        let nearly_expired = CachedToken {
            access_token: "t".to_string(),
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(10), // inside the 30s margin
        };
        assert!(!nearly_expired.is_usable());
    }

    #[tokio::test]
    async fn test_missing_credentials_yield_guidance() {
        let auth = ServiceAccountAuth::new(
            reqwest::Client::new(),
            "http://localhost:9/token".to_string(),
            "rhsm-api".to_string(),
            None,
            None,
        );
        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized { .. }));
        assert!(err.to_string().contains("service account"));
    }
}
