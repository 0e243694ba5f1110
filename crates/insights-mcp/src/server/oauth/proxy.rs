//! The authorization orchestrator.
//!
//! Bridges MCP clients that expect dynamic client registration to an
//! upstream IdP that has exactly one pre-registered application. Drives the
//! transaction state machine: client authorize request → upstream redirect →
//! upstream callback → confidential code exchange → proxy code → PKCE-gated
//! token exchange. Tokens leave the proxy only through
//! [`OidcProxy::exchange_code`], gated on proof of possession of the
//! original PKCE verifier.

use std::sync::Arc;

use url::Url;

use super::error::{AuthError, AuthResult};
use super::pkce;
use super::redirect::RedirectPolicy;
use super::store::TransactionStore;
use super::types::{
    ClientIdentity, ProxyAuthCode, TokenBundle, TokenRecord, Transaction, TxnState, random_token,
};
use super::upstream::UpstreamOidc;
use crate::config::OAuthConfig;

/// Parameters of a client authorization request, already shape-checked by
/// the HTTP layer.
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: Option<String>,
    pub scope: Option<String>,
}

/// The DCR proxy core.
pub struct OidcProxy {
    store: Arc<dyn TransactionStore>,
    upstream: Arc<UpstreamOidc>,
    policy: RedirectPolicy,
    config: OAuthConfig,
}

impl OidcProxy {
    /// Wire the orchestrator to its store and upstream client.
    ///
    /// # Errors
    ///
    /// Returns an error when a redirect allow-list pattern does not compile.
    pub fn new(
        config: OAuthConfig,
        store: Arc<dyn TransactionStore>,
        upstream: Arc<UpstreamOidc>,
    ) -> AuthResult<Self> {
        let policy = RedirectPolicy::new(&config.allowed_redirects)?;
        Ok(Self { store, upstream, policy, config })
    }

    /// Proxy configuration (metadata handlers need the public base URL and
    /// scope list).
    #[must_use]
    pub const fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// The upstream client handle (shared with the token validator).
    #[must_use]
    pub fn upstream(&self) -> Arc<UpstreamOidc> {
        Arc::clone(&self.upstream)
    }

    /// The fixed callback URI registered with the upstream IdP.
    #[must_use]
    pub fn callback_uri(&self) -> String {
        format!("{}/oauth/callback", self.config.public_base_url.trim_end_matches('/'))
    }

    /// Dynamic client registration: validate the redirect URIs and hand out
    /// the shared upstream identity. Nothing is persisted — URIs are
    /// re-validated on every authorization request.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidRedirectUri`] when any URI falls outside the
    /// allow-list.
    pub fn register(&self, redirect_uris: &[String]) -> AuthResult<ClientIdentity> {
        self.policy.check_all(redirect_uris)?;

        let identity = self.upstream.identity();
        // Local tracking id for log correlation only.
        tracing::info!(
            client_id = %identity.client_id(),
            registration = %random_token(),
            uris = redirect_uris.len(),
            "Registered MCP client on shared upstream identity"
        );
        Ok(identity)
    }

    /// Begin an authorization flow: create the transaction and build the
    /// upstream redirect.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidRedirectUri`] or [`AuthError::InvalidRequest`]
    /// before anything is stored; [`AuthError::UpstreamUnavailable`] when
    /// discovery fails.
    pub async fn start_authorization(&self, params: AuthorizeParams) -> AuthResult<String> {
        if !self.policy.is_allowed(&params.redirect_uri) {
            return Err(AuthError::InvalidRedirectUri);
        }
        if params.code_challenge_method != "S256" {
            return Err(AuthError::InvalidRequest(
                "code_challenge_method must be S256".to_string(),
            ));
        }
        if params.code_challenge.is_empty() {
            return Err(AuthError::InvalidRequest("code_challenge is required".to_string()));
        }

        let scope = params
            .scope
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.required_scopes.join(" "));

        let mut txn = Transaction::new(
            params.redirect_uri,
            params.state,
            params.code_challenge,
            scope,
            self.config.transaction_ttl,
        );
        self.store.insert_transaction(txn.clone()).await;

        // Build the upstream URL with the proxy's fixed callback, never the
        // client's redirect URI.
        let meta = self.upstream.metadata().await?;
        let mut auth_url = Url::parse(&meta.authorization_endpoint)
            .map_err(|e| AuthError::InvalidRequest(format!("bad authorization endpoint: {e}")))?;
        auth_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", self.upstream.identity().client_id())
            .append_pair("redirect_uri", &self.callback_uri())
            .append_pair("state", &txn.upstream_state)
            .append_pair("scope", &txn.scope);

        txn.state = TxnState::UpstreamRedirected;
        self.store.update_transaction(txn.clone()).await;

        tracing::info!(transaction = %txn.transaction_id, "Redirecting to upstream IdP");
        Ok(auth_url.into())
    }

    /// Handle the upstream callback on the proxy's fixed redirect URI.
    ///
    /// Returns the redirect back to the MCP client — carrying either the
    /// minted proxy code or an OAuth error. Failures after this point are
    /// delivered as error redirects, because a validated client redirect
    /// URI is known; only an unmatchable `state` yields a direct error.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownTransaction`] when `state` matches no live
    /// transaction (expired transactions are identical to absent ones).
    pub async fn handle_upstream_callback(
        &self,
        upstream_state: &str,
        code: Option<&str>,
        error: Option<&str>,
    ) -> AuthResult<String> {
        let mut txn = self
            .store
            .take_transaction(upstream_state)
            .await
            .ok_or(AuthError::UnknownTransaction)?;

        if let Some(upstream_error) = error {
            tracing::warn!(
                transaction = %txn.transaction_id,
                error = %upstream_error,
                "Upstream authorization failed"
            );
            txn.state = TxnState::Failed;
            self.store.update_transaction(txn.clone()).await;
            return Ok(error_redirect(&txn, "access_denied", "authorization was not granted"));
        }

        let Some(upstream_code) = code else {
            txn.state = TxnState::Failed;
            self.store.update_transaction(txn.clone()).await;
            return Ok(error_redirect(&txn, "invalid_request", "missing authorization code"));
        };

        txn.state = TxnState::UpstreamReturned;
        self.store.update_transaction(txn.clone()).await;

        // Confidential exchange; not retried — the upstream code is single
        // use, so a retry could only fail.
        let mut bundle = match self.upstream.exchange_code(upstream_code, &self.callback_uri()).await
        {
            Ok(bundle) => bundle,
            Err(AuthError::UpstreamUnavailable) => {
                txn.state = TxnState::Failed;
                self.store.update_transaction(txn.clone()).await;
                return Ok(error_redirect(
                    &txn,
                    "temporarily_unavailable",
                    "identity provider did not respond",
                ));
            }
            Err(_) => {
                txn.state = TxnState::Failed;
                self.store.update_transaction(txn.clone()).await;
                return Ok(error_redirect(&txn, "access_denied", "code exchange was rejected"));
            }
        };

        if bundle.scope.is_empty() {
            // RFC 6749 §5.1: omitted scope means "as requested".
            bundle.scope = txn.scope.clone();
        }

        let proxy_code = ProxyAuthCode::mint(&txn, bundle, self.config.code_ttl);
        self.store.insert_code(proxy_code.clone()).await;

        txn.state = TxnState::CodeIssued;
        self.store.update_transaction(txn.clone()).await;

        tracing::info!(transaction = %txn.transaction_id, "Issued proxy authorization code");

        let mut redirect = Url::parse(&txn.client_redirect_uri)
            .map_err(|e| AuthError::InvalidRequest(format!("bad redirect URI: {e}")))?;
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &proxy_code.code);
            if let Some(ref client_state) = txn.client_state {
                query.append_pair("state", client_state);
            }
        }
        Ok(redirect.into())
    }

    /// Exchange a proxy code for the upstream token bundle.
    ///
    /// The only path by which tokens leave the proxy. The code is consumed
    /// atomically (at most one of N concurrent attempts succeeds) and the
    /// verifier must hash to the challenge captured at `start_authorization`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidGrant`] for a missing, expired, or already
    /// consumed code (one indistinguishable error for all three);
    /// [`AuthError::PkceMismatch`] when the verifier fails.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: Option<&str>,
    ) -> AuthResult<TokenBundle> {
        let proxy_code = self.store.consume_code(code).await.ok_or(AuthError::InvalidGrant)?;

        if let Some(uri) = redirect_uri {
            if uri != proxy_code.redirect_uri {
                return Err(AuthError::InvalidGrant);
            }
        }

        if !pkce::verify_s256(code_verifier, &proxy_code.code_challenge) {
            tracing::warn!(transaction = %proxy_code.transaction_id, "PKCE verification failed");
            return Err(AuthError::PkceMismatch);
        }

        // Terminal: the transaction is done once its code is redeemed.
        self.store.remove_transaction(&proxy_code.transaction_id).await;

        if let Some(record) = TokenRecord::for_bundle(&proxy_code.upstream_tokens) {
            self.store.insert_token_record(record).await;
        }

        tracing::info!(transaction = %proxy_code.transaction_id, "Exchanged proxy code for tokens");
        Ok(proxy_code.upstream_tokens)
    }

    /// Forward a refresh grant upstream.
    ///
    /// Rejections are terminal for the token: the record is dropped and the
    /// client must re-authorize. No automatic retry.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidGrant`] on upstream rejection,
    /// [`AuthError::UpstreamUnavailable`] on transport failure.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        let hash = TokenRecord::hash_refresh_token(refresh_token);
        let previous = self.store.take_token_record(&hash).await;

        let mut bundle = match self.upstream.refresh(refresh_token).await {
            Ok(bundle) => bundle,
            Err(AuthError::UpstreamUnavailable) => {
                // Transient outage: the token may still be good, keep the
                // record for the retry the client will make.
                if let Some(record) = previous {
                    self.store.insert_token_record(record).await;
                }
                return Err(AuthError::UpstreamUnavailable);
            }
            // Rejection is terminal for this token; the record stays gone.
            Err(e) => return Err(e),
        };

        if bundle.scope.is_empty() {
            if let Some(record) = &previous {
                bundle.scope = record.scope.clone();
            }
        }
        if let Some(record) = TokenRecord::for_bundle(&bundle) {
            self.store.insert_token_record(record).await;
        }
        Ok(bundle)
    }
}

/// Build an OAuth error redirect to the client's validated redirect URI.
fn error_redirect(txn: &Transaction, error: &str, description: &str) -> String {
    let mut url = match Url::parse(&txn.client_redirect_uri) {
        Ok(url) => url,
        // The URI was validated at start_authorization; a parse failure here
        // means the store was tampered with — fall back to a bare fragment.
        Err(_) => return format!("about:blank#error={error}"),
    };
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", error);
        query.append_pair("error_description", description);
        if let Some(ref client_state) = txn.client_state {
            query.append_pair("state", client_state);
        }
    }
    url.into()
}

impl std::fmt::Debug for OidcProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProxy").field("callback_uri", &self.callback_uri()).finish()
    }
}
