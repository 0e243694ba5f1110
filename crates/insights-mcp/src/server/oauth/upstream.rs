//! Upstream OIDC client.
//!
//! Thin but security-relevant: OIDC metadata discovery (fetched once and
//! cached), a JWKS cache with a forced-refresh path for key rotation, and
//! the two confidential-client grants (authorization-code exchange,
//! refresh). Discovery and JWKS fetches are idempotent and go through the
//! retrying client; grant posts never retry — an authorization code is
//! single-use upstream, so a blind replay could only fail.

use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::error::{AuthError, AuthResult};
use super::types::{ClientIdentity, TokenBundle};
use crate::config::oauth::JWKS_TTL;

/// OIDC provider metadata, the subset the proxy needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
}

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= JWKS_TTL
    }
}

/// Client for the fixed upstream identity provider.
pub struct UpstreamOidc {
    /// Retrying client for idempotent fetches (discovery, JWKS).
    discovery_http: ClientWithMiddleware,

    /// Non-retrying client for grant posts.
    token_http: reqwest::Client,

    config_url: String,

    /// The proxy's own registered application. The secret stays here; MCP
    /// clients only ever see the client id through [`Self::identity`].
    client_id: String,
    client_secret: String,

    metadata: RwLock<Option<ProviderMetadata>>,
    jwks: RwLock<Option<CachedJwks>>,
}

impl UpstreamOidc {
    /// Create a client for the provider behind `config_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed.
    pub fn new(
        config_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base = reqwest::Client::builder().timeout(timeout).build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(500), Duration::from_secs(5))
            .build_with_max_retries(3);
        let discovery_http = ClientBuilder::new(base.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            discovery_http,
            token_http: base,
            config_url,
            client_id,
            client_secret,
            metadata: RwLock::new(None),
            jwks: RwLock::new(None),
        })
    }

    /// The shared identity handed out at registration. Never includes the
    /// secret.
    #[must_use]
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::SharedUpstream { client_id: self.client_id.clone() }
    }

    /// Provider metadata, fetched on first use and cached for the process
    /// lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UpstreamUnavailable`] when discovery fails.
    pub async fn metadata(&self) -> AuthResult<ProviderMetadata> {
        if let Some(meta) = self.metadata.read().await.as_ref() {
            return Ok(meta.clone());
        }

        let meta: ProviderMetadata = self
            .discovery_http
            .get(&self.config_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "OIDC discovery failed");
                AuthError::UpstreamUnavailable
            })?
            .error_for_status()
            .map_err(|_| AuthError::UpstreamUnavailable)?
            .json()
            .await
            .map_err(|_| AuthError::UpstreamUnavailable)?;

        tracing::info!(issuer = %meta.issuer, "Discovered upstream OIDC metadata");
        *self.metadata.write().await = Some(meta.clone());
        Ok(meta)
    }

    /// The provider's key set, cached with a TTL.
    ///
    /// `force_refresh` bypasses the cache; the validator uses it once when a
    /// signature fails against possibly stale keys.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UpstreamUnavailable`] when the JWKS fetch fails.
    pub async fn jwks(&self, force_refresh: bool) -> AuthResult<JwkSet> {
        if !force_refresh {
            if let Some(cached) = self.jwks.read().await.as_ref() {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let jwks_uri = self.metadata().await?.jwks_uri;
        tracing::debug!(uri = %jwks_uri, "Fetching JWKS");

        let keys: JwkSet = self
            .discovery_http
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|_| AuthError::UpstreamUnavailable)?
            .error_for_status()
            .map_err(|_| AuthError::UpstreamUnavailable)?
            .json()
            .await
            .map_err(|_| AuthError::UpstreamUnavailable)?;

        *self.jwks.write().await = Some(CachedJwks { keys: keys.clone(), fetched_at: Instant::now() });
        Ok(keys)
    }

    /// Find the decoding key for `kid`, forcing one JWKS refresh when the
    /// cached set does not know it.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenInvalidSignature`] when no key matches even after a
    /// refresh; [`AuthError::UpstreamUnavailable`] when the JWKS cannot be
    /// fetched at all.
    pub async fn decoding_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        let jwks = self.jwks(false).await?;
        if let Some(key) = find_key(&jwks, kid) {
            return Ok(key);
        }

        tracing::debug!(kid = %kid, "Key not in cached JWKS, refreshing");
        let jwks = self.jwks(true).await?;
        find_key(&jwks, kid).ok_or(AuthError::TokenInvalidSignature)
    }

    /// Exchange an upstream authorization code, using the proxy's own
    /// registered secret. Confidential: this is the only place the secret
    /// is put on the wire.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidGrant`] on upstream rejection,
    /// [`AuthError::UpstreamUnavailable`] on transport failure.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AuthResult<TokenBundle> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(&params).await
    }

    /// Forward a refresh-token grant. Never retried: refresh failures are
    /// terminal for that token.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidGrant`] on upstream rejection,
    /// [`AuthError::UpstreamUnavailable`] on transport failure.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        let params = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AuthResult<TokenBundle> {
        let token_endpoint = self.metadata().await?.token_endpoint;

        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", &self.client_id));
        form.push(("client_secret", &self.client_secret));

        let response = self
            .token_http
            .post(&token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Upstream token request failed");
                AuthError::UpstreamUnavailable
            })?;

        let status = response.status();
        if status.is_client_error() {
            // Log the detail, surface only the generic grant error.
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Upstream rejected grant");
            return Err(AuthError::InvalidGrant);
        }
        if !status.is_success() {
            tracing::error!(status = %status, "Upstream token endpoint error");
            return Err(AuthError::UpstreamUnavailable);
        }

        let token: TokenResponse =
            response.json().await.map_err(|_| AuthError::UpstreamUnavailable)?;

        Ok(TokenBundle {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in.unwrap_or(300),
            scope: token.scope.unwrap_or_default(),
        })
    }
}

/// Find a JWK by `kid` and convert it to a decoding key.
fn find_key(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        if jwk.common.key_id.as_deref() != Some(kid) {
            continue;
        }
        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

impl std::fmt::Debug for UpstreamOidc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamOidc")
            .field("config_url", &self.config_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_metadata_parses_keycloak_document() {
        let doc = serde_json::json!({
            "issuer": "https://sso.example.com/auth/realms/redhat-external",
            "authorization_endpoint": "https://sso.example.com/auth/realms/redhat-external/protocol/openid-connect/auth",
            "token_endpoint": "https://sso.example.com/auth/realms/redhat-external/protocol/openid-connect/token",
            "jwks_uri": "https://sso.example.com/auth/realms/redhat-external/protocol/openid-connect/certs",
            "scopes_supported": ["openid", "api.console"],
            "response_types_supported": ["code"],
            "unrecognized_field": {"ignored": true}
        });

        let meta: ProviderMetadata = serde_json::from_value(doc).unwrap();
        assert!(meta.token_endpoint.ends_with("/token"));
        assert_eq!(meta.scopes_supported.len(), 2);
    }

    #[test]
    fn test_token_response_defaults() {
        let json = serde_json::json!({"access_token": "abc"});
        let token: TokenResponse = serde_json::from_value(json).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn test_find_key_ignores_unknown_kid() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({"keys": []})).unwrap();
        assert!(find_key(&jwks, "absent").is_none());
    }
}
