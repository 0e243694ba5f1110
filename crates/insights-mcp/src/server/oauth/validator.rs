//! Bearer token validation.
//!
//! Gates every inbound tool-invocation request: signature against the
//! upstream JWKS, time claims, and a required-scope superset check. The
//! three failure modes stay distinct all the way to the wire — an expired
//! token, a bad signature, and missing scopes are different problems and
//! are never collapsed into one another.

use jsonwebtoken::{Algorithm, Header, Validation, errors::ErrorKind};
use serde::Deserialize;

use super::error::{AuthError, AuthResult};
use super::upstream::UpstreamOidc;
use std::sync::Arc;

/// Identity extracted from a validated bearer token.
#[derive(Debug, Clone)]
pub struct Principal {
    /// OIDC `sub` claim.
    pub subject: String,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// The raw bearer token, forwarded to the console APIs on tool calls.
    pub token: String,
}

impl Principal {
    /// Check a single scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Claims the validator reads from an access token.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    /// Space-separated, per RFC 8693 / Keycloak convention.
    #[serde(default)]
    scope: String,
    #[allow(dead_code)]
    exp: u64,
}

/// Validates bearer tokens against the upstream key set.
pub struct TokenValidator {
    upstream: Arc<UpstreamOidc>,
    required_scopes: Vec<String>,
}

impl TokenValidator {
    #[must_use]
    pub fn new(upstream: Arc<UpstreamOidc>, required_scopes: Vec<String>) -> Self {
        Self { upstream, required_scopes }
    }

    /// Validate a bearer token and return the caller's identity.
    ///
    /// Tolerates a slightly stale key cache: a signature failure triggers
    /// exactly one forced JWKS refresh and one retry before the token is
    /// declared invalid.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenExpired`], [`AuthError::TokenInvalidSignature`], or
    /// [`AuthError::InsufficientScope`]; [`AuthError::UpstreamUnavailable`]
    /// when the key set cannot be fetched at all.
    pub async fn validate(&self, token: &str) -> AuthResult<Principal> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|_| AuthError::TokenInvalidSignature)?;
        let kid = header.kid.clone().ok_or(AuthError::TokenInvalidSignature)?;

        let validation = build_validation(&header);

        let key = self.upstream.decoding_key(&kid).await?;
        let claims = match jsonwebtoken::decode::<Claims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                // The upstream may have rotated keys under the same kid;
                // refresh once and retry before rejecting.
                self.upstream.jwks(true).await?;
                let key = self.upstream.decoding_key(&kid).await?;
                jsonwebtoken::decode::<Claims>(token, &key, &validation)
                    .map_err(classify)?
                    .claims
            }
            Err(e) => return Err(classify(e)),
        };

        let scopes: Vec<String> = claims.scope.split_whitespace().map(ToString::to_string).collect();
        check_scopes(&scopes, &self.required_scopes)?;

        Ok(Principal { subject: claims.sub, scopes, token: token.to_string() })
    }
}

/// Verify the granted scopes are a superset of the required set.
fn check_scopes(granted: &[String], required: &[String]) -> AuthResult<()> {
    for scope in required {
        if !granted.iter().any(|s| s == scope) {
            tracing::warn!(missing = %scope, "Token missing required scope");
            return Err(AuthError::InsufficientScope);
        }
    }
    Ok(())
}

/// Map jsonwebtoken failures onto the validator's taxonomy.
fn classify(error: jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalidSignature,
    }
}

/// Validation settings from the token header: asymmetric algorithms only,
/// 60 seconds of clock leeway, exp and nbf enforced.
fn build_validation(header: &Header) -> Validation {
    let alg = match header.alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::ES256
        | Algorithm::ES384 => header.alg,
        _ => Algorithm::RS256,
    };
    let mut validation = Validation::new(alg);
    validation.leeway = 60;
    validation.validate_nbf = true;
    // Audience varies per console client; scope checking is the gate here.
    validation.validate_aud = false;
    validation
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_superset_passes() {
        let granted = scopes(&["openid", "api.console", "api.ocm", "extra"]);
        let required = scopes(&["openid", "api.console", "api.ocm"]);
        assert!(check_scopes(&granted, &required).is_ok());
    }

    #[test]
    fn test_strict_subset_fails() {
        // Valid signature and expiry are irrelevant: a strict subset of the
        // required scopes is always rejected.
        let granted = scopes(&["openid", "api.console"]);
        let required = scopes(&["openid", "api.console", "api.ocm"]);
        assert!(matches!(
            check_scopes(&granted, &required),
            Err(AuthError::InsufficientScope)
        ));
    }

    #[test]
    fn test_empty_required_always_passes() {
        assert!(check_scopes(&scopes(&[]), &scopes(&[])).is_ok());
        assert!(check_scopes(&scopes(&["anything"]), &scopes(&[])).is_ok());
    }

    #[test]
    fn test_classify_time_errors() {
        let expired = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature);
        assert!(matches!(classify(expired), AuthError::TokenExpired));

        let immature = jsonwebtoken::errors::Error::from(ErrorKind::ImmatureSignature);
        assert!(matches!(classify(immature), AuthError::TokenExpired));

        let bad_sig = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature);
        assert!(matches!(classify(bad_sig), AuthError::TokenInvalidSignature));

        let garbage = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken);
        assert!(matches!(classify(garbage), AuthError::TokenInvalidSignature));
    }

    #[test]
    fn test_validation_settings() {
        let header = Header::new(Algorithm::RS256);
        let validation = build_validation(&header);
        assert_eq!(validation.leeway, 60);
        assert!(validation.validate_nbf);
        assert!(!validation.validate_aud);
    }

    #[test]
    fn test_symmetric_algorithms_downgraded() {
        // HS256 from an attacker-controlled header must not select a
        // symmetric verification path.
        let header = Header::new(Algorithm::HS256);
        let validation = build_validation(&header);
        assert_eq!(validation.algorithms, vec![Algorithm::RS256]);
    }

    #[test]
    fn test_principal_scope_lookup() {
        let principal = Principal {
            subject: "f:123:user".to_string(),
            scopes: scopes(&["openid", "api.console"]),
            token: "raw".to_string(),
        };
        assert!(principal.has_scope("openid"));
        assert!(!principal.has_scope("api.ocm"));
    }
}
