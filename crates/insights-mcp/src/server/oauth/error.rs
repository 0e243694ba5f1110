//! OAuth proxy error taxonomy.
//!
//! Every failure on the authorization path maps to an RFC 6749 error code
//! and an HTTP status. Messages are deliberately generic: callers must not
//! be able to distinguish a code that never existed from one that was
//! already redeemed.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors on the OAuth authorization path.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// A redirect URI failed the allow-list check.
    #[error("redirect_uri is not allowed")]
    InvalidRedirectUri,

    /// A required parameter is missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream callback state matched no live transaction. Covers
    /// expired transactions too; the two are indistinguishable by design.
    #[error("unknown or expired authorization request")]
    UnknownTransaction,

    /// The grant is missing, expired, or already consumed.
    #[error("invalid, expired, or already redeemed grant")]
    InvalidGrant,

    /// The presented code_verifier does not hash to the stored challenge.
    #[error("PKCE verification failed")]
    PkceMismatch,

    /// The bearer token is past its expiry (or not yet valid).
    #[error("token has expired")]
    TokenExpired,

    /// The bearer token signature could not be verified.
    #[error("token signature verification failed")]
    TokenInvalidSignature,

    /// The bearer token lacks one of the required scopes.
    #[error("token is missing a required scope")]
    InsufficientScope,

    /// The upstream identity provider did not answer in time.
    #[error("upstream identity provider unavailable")]
    UpstreamUnavailable,

    /// Transaction store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl AuthError {
    /// RFC 6749 / RFC 6750 error code for the JSON body.
    #[must_use]
    pub const fn oauth_code(&self) -> &'static str {
        match self {
            Self::InvalidRedirectUri | Self::InvalidRequest(_) => "invalid_request",
            // PKCE failures are invalid_grant on the wire (RFC 6749 §5.2);
            // the distinct variant keeps logs and tests precise.
            Self::UnknownTransaction | Self::InvalidGrant | Self::PkceMismatch => "invalid_grant",
            Self::TokenExpired | Self::TokenInvalidSignature => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::UpstreamUnavailable => "temporarily_unavailable",
            Self::Store(_) => "server_error",
        }
    }

    /// HTTP status paired with the error code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRedirectUri
            | Self::InvalidRequest(_)
            | Self::UnknownTransaction
            | Self::InvalidGrant
            | Self::PkceMismatch => StatusCode::BAD_REQUEST,
            Self::TokenExpired | Self::TokenInvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope => StatusCode::FORBIDDEN,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.oauth_code(),
            "error_description": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

/// Result alias for OAuth proxy operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(AuthError::InvalidGrant.oauth_code(), "invalid_grant");
        assert_eq!(AuthError::PkceMismatch.oauth_code(), "invalid_grant");
        assert_eq!(AuthError::UnknownTransaction.oauth_code(), "invalid_grant");
        assert_eq!(AuthError::InsufficientScope.oauth_code(), "insufficient_scope");
        assert_eq!(AuthError::InvalidRedirectUri.oauth_code(), "invalid_request");
    }

    #[test]
    fn test_statuses() {
        assert_eq!(AuthError::InvalidGrant.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InsufficientScope.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::UpstreamUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_expired_and_absent_share_wire_shape() {
        // Same error code and status for an expired and an unknown grant.
        assert_eq!(
            AuthError::UnknownTransaction.oauth_code(),
            AuthError::InvalidGrant.oauth_code()
        );
        assert_eq!(AuthError::UnknownTransaction.status(), AuthError::InvalidGrant.status());
    }
}
