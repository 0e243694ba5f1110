//! OAuth 2.0 dynamic-client-registration proxy.
//!
//! MCP clients expect their authorization server to support DCR; Red Hat
//! SSO does not. This module bridges the two: a standards-shaped facade
//! (discovery, registration, authorization, token endpoints) in front of a
//! single pre-registered upstream application, with all flow state in a
//! pluggable TTL-aware store and every inbound tool call gated by JWT
//! validation against the upstream key set.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 6749: Authorization Code Grant

pub mod error;
pub mod handlers;
pub mod pkce;
pub mod proxy;
pub mod redirect;
pub mod store;
pub mod types;
pub mod upstream;
pub mod validator;

use std::sync::Arc;

pub use error::{AuthError, AuthResult};
pub use proxy::OidcProxy;
pub use store::{MemoryStore, TransactionStore, start_sweep_task};
pub use upstream::UpstreamOidc;
pub use validator::{Principal, TokenValidator};

use crate::config::{Config, OAuthConfig, oauth as oauth_defaults};

/// Everything the HTTP transport needs to serve the OAuth surface.
pub struct OAuthState {
    pub proxy: Arc<OidcProxy>,
    pub validator: Arc<TokenValidator>,
}

impl OAuthState {
    /// Assemble proxy, validator, and store from configuration and spawn
    /// the expiry sweep.
    ///
    /// # Errors
    ///
    /// Fails when the upstream HTTP client cannot be built or a redirect
    /// pattern does not compile.
    pub fn from_config(config: &Config, oauth: &OAuthConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
        start_sweep_task(Arc::clone(&store), oauth_defaults::SWEEP_INTERVAL);

        let upstream = Arc::new(UpstreamOidc::new(
            config.sso_config_url(),
            oauth.sso_client_id.clone(),
            oauth.sso_client_secret.clone(),
            oauth.sso_timeout,
        )?);

        let validator =
            Arc::new(TokenValidator::new(Arc::clone(&upstream), oauth.required_scopes.clone()));
        let proxy = Arc::new(OidcProxy::new(oauth.clone(), store, upstream)?);

        Ok(Self { proxy, validator })
    }
}

impl std::fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthState").finish()
    }
}
