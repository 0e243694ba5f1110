//! Records held by the transaction store during an authorization flow.
//!
//! All timestamps are absolute UTC so that any server instance sharing the
//! store evaluates expiry identically, and every record derives serde so a
//! durable store implementation can persist it as-is.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Generate an unguessable 256-bit token (two simple UUIDv4s).
#[must_use]
pub fn random_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// State machine of an authorization transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnState {
    Created,
    UpstreamRedirected,
    UpstreamReturned,
    CodeIssued,
    Exchanged,
    Expired,
    Failed,
}

/// One in-flight authorization attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Primary key. Opaque and unguessable.
    pub transaction_id: String,

    /// The MCP client's redirect URI, already allow-list validated.
    pub client_redirect_uri: String,

    /// The client's own `state` parameter, echoed on the final redirect.
    pub client_state: Option<String>,

    /// PKCE challenge presented by the client.
    pub client_pkce_challenge: String,

    /// PKCE method; only `S256` is accepted.
    pub challenge_method: String,

    /// Space-joined requested scopes.
    pub scope: String,

    /// Server-generated state sent to the upstream IdP; secondary lookup
    /// key for the callback.
    pub upstream_state: String,

    /// Current position in the flow.
    pub state: TxnState,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a fresh transaction in `Created` state.
    #[must_use]
    pub fn new(
        client_redirect_uri: String,
        client_state: Option<String>,
        client_pkce_challenge: String,
        scope: String,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: random_token(),
            client_redirect_uri,
            client_state,
            client_pkce_challenge,
            challenge_method: "S256".to_string(),
            scope,
            upstream_state: random_token(),
            state: TxnState::Created,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if the transaction has passed its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Access/refresh token pair obtained from the upstream IdP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires.
    pub expires_in: u64,
    pub scope: String,
}

/// Single-use code minted by the proxy and handed to the MCP client.
///
/// Carries everything the token exchange needs so the exchange never has to
/// re-read the transaction: the challenge to verify, the redirect URI to
/// compare, and the upstream tokens to release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyAuthCode {
    pub code: String,

    /// Back-reference to the owning transaction (lookup only).
    pub transaction_id: String,

    pub redirect_uri: String,
    pub code_challenge: String,
    pub scope: String,

    /// Upstream tokens held server-side until the client proves possession
    /// of the PKCE verifier.
    pub upstream_tokens: TokenBundle,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProxyAuthCode {
    /// Mint a code bound to a transaction and its upstream tokens.
    #[must_use]
    pub fn mint(txn: &Transaction, upstream_tokens: TokenBundle, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            code: random_token(),
            transaction_id: txn.transaction_id.clone(),
            redirect_uri: txn.client_redirect_uri.clone(),
            code_challenge: txn.client_pkce_challenge.clone(),
            scope: txn.scope.clone(),
            upstream_tokens,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if the code has passed its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Identity returned to dynamically "registered" clients.
///
/// The upstream IdP has exactly one pre-registered application, so every
/// registrant is mapped onto that shared identity. The enum keeps the
/// simplification explicit: a future per-client registration model gets its
/// own variant instead of a silent behavior change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientIdentity {
    /// All registrants share the proxy's upstream client id. The matching
    /// secret never leaves the proxy.
    SharedUpstream { client_id: String },

    /// Reserved: a client with its own upstream registration.
    PerClient { client_id: String, client_secret: String },
}

impl ClientIdentity {
    /// The client id presented to MCP clients.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::SharedUpstream { client_id } | Self::PerClient { client_id, .. } => client_id,
        }
    }
}

/// Bookkeeping record for an issued token bundle.
///
/// The refresh token is stored as a one-way hash only, so a compromised
/// store cannot be replayed against the upstream IdP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub refresh_token_hash: String,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Record an issued bundle. Returns `None` when the bundle carried no
    /// refresh token (nothing to track).
    #[must_use]
    pub fn for_bundle(bundle: &TokenBundle) -> Option<Self> {
        let refresh = bundle.refresh_token.as_deref()?;
        let now = Utc::now();
        Some(Self {
            refresh_token_hash: Self::hash_refresh_token(refresh),
            scope: bundle.scope.clone(),
            issued_at: now,
            access_expires_at: now + Duration::from_secs(bundle.expires_in),
        })
    }

    /// SHA-256 hex digest of a refresh token, the store lookup key.
    #[must_use]
    pub fn hash_refresh_token(refresh_token: &str) -> String {
        let digest = Sha256::digest(refresh_token.as_bytes());
        let mut out = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_txn(ttl: Duration) -> Transaction {
        Transaction::new(
            "http://localhost:55454/cb".to_string(),
            Some("client-state".to_string()),
            "challenge".to_string(),
            "openid api.console".to_string(),
            ttl,
        )
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, random_token());
    }

    #[test]
    fn test_transaction_starts_created() {
        let txn = sample_txn(Duration::from_secs(600));
        assert_eq!(txn.state, TxnState::Created);
        assert!(!txn.is_expired());
        assert_ne!(txn.transaction_id, txn.upstream_state);
    }

    #[test]
    fn test_transaction_zero_ttl_is_expired() {
        let txn = sample_txn(Duration::ZERO);
        assert!(txn.is_expired());
    }

    #[test]
    fn test_code_inherits_transaction_fields() {
        let txn = sample_txn(Duration::from_secs(600));
        let bundle = TokenBundle {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_in: 900,
            scope: txn.scope.clone(),
        };
        let code = ProxyAuthCode::mint(&txn, bundle, Duration::from_secs(60));

        assert_eq!(code.transaction_id, txn.transaction_id);
        assert_eq!(code.redirect_uri, txn.client_redirect_uri);
        assert_eq!(code.code_challenge, txn.client_pkce_challenge);
        assert!(!code.is_expired());
    }

    #[test]
    fn test_client_identity_exposes_id_only() {
        let identity = ClientIdentity::SharedUpstream { client_id: "insights-mcp".to_string() };
        assert_eq!(identity.client_id(), "insights-mcp");

        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("shared_upstream"));
    }

    #[test]
    fn test_refresh_token_hash_is_one_way_and_stable() {
        let h1 = TokenRecord::hash_refresh_token("refresh-abc");
        let h2 = TokenRecord::hash_refresh_token("refresh-abc");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(!h1.contains("refresh-abc"));
        assert_ne!(h1, TokenRecord::hash_refresh_token("refresh-abd"));
    }

    #[test]
    fn test_token_record_skips_bundle_without_refresh() {
        let bundle = TokenBundle {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: 900,
            scope: "openid".to_string(),
        };
        assert!(TokenRecord::for_bundle(&bundle).is_none());
    }
}
