//! Redirect URI allow-listing.
//!
//! Operators configure a list of patterns where `*` matches any run of
//! characters; the default list admits loopback addresses on any port. A
//! URI must also survive basic hygiene checks (absolute http/https, no
//! userinfo, no fragment) before pattern matching — otherwise
//! `http://localhost:1@evil.example/` would satisfy a loopback pattern
//! while actually pointing at `evil.example`.

use regex::Regex;
use url::Url;

use super::error::{AuthError, AuthResult};

/// Compiled redirect URI allow-list.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    patterns: Vec<(String, Regex)>,
}

impl RedirectPolicy {
    /// Compile a list of `*`-wildcard patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRequest`] when a pattern does not compile.
    pub fn new(patterns: &[String]) -> AuthResult<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = compile_pattern(pattern)
                .map_err(|e| AuthError::InvalidRequest(format!("bad redirect pattern: {e}")))?;
            compiled.push((pattern.clone(), regex));
        }
        Ok(Self { patterns: compiled })
    }

    /// Check a single redirect URI against the allow-list.
    #[must_use]
    pub fn is_allowed(&self, uri: &str) -> bool {
        let Ok(url) = Url::parse(uri) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return false;
        }
        if url.fragment().is_some() {
            return false;
        }
        self.patterns.iter().any(|(_, regex)| regex.is_match(uri))
    }

    /// Validate a set of redirect URIs, as submitted at registration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidRedirectUri`] when the set is empty or
    /// any member fails the check.
    pub fn check_all(&self, uris: &[String]) -> AuthResult<()> {
        if uris.is_empty() {
            return Err(AuthError::InvalidRedirectUri);
        }
        for uri in uris {
            if !self.is_allowed(uri) {
                tracing::warn!(redirect_uri = %uri, "Rejected redirect URI");
                return Err(AuthError::InvalidRedirectUri);
            }
        }
        Ok(())
    }
}

/// Turn a `*`-wildcard pattern into an anchored regex. Patterns without a
/// wildcard match exactly.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped: Vec<String> = pattern.split('*').map(|part| regex::escape(part)).collect();
    Regex::new(&format!("^{}$", escaped.join(".*")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_policy() -> RedirectPolicy {
        RedirectPolicy::new(&[
            "http://localhost:*".to_string(),
            "http://127.0.0.1:*".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_loopback_any_port_allowed() {
        let policy = loopback_policy();
        assert!(policy.is_allowed("http://localhost:55454/cb"));
        assert!(policy.is_allowed("http://localhost:3000/oauth/callback"));
        assert!(policy.is_allowed("http://127.0.0.1:8080/done"));
    }

    #[test]
    fn test_non_loopback_rejected() {
        let policy = loopback_policy();
        assert!(!policy.is_allowed("https://attacker.example/cb"));
        assert!(!policy.is_allowed("http://localhost.evil.example/cb"));
    }

    #[test]
    fn test_userinfo_trick_rejected() {
        let policy = loopback_policy();
        // Host is evil.example; the literal prefix only looks like loopback.
        assert!(!policy.is_allowed("http://localhost:1@evil.example/cb"));
    }

    #[test]
    fn test_fragment_and_scheme_rejected() {
        let policy = loopback_policy();
        assert!(!policy.is_allowed("http://localhost:3000/cb#fragment"));
        assert!(!policy.is_allowed("custom-scheme://localhost:3000/cb"));
        assert!(!policy.is_allowed("not a uri"));
    }

    #[test]
    fn test_explicit_https_pattern() {
        let policy =
            RedirectPolicy::new(&["https://claude.ai/api/mcp/auth_callback".to_string()]).unwrap();
        assert!(policy.is_allowed("https://claude.ai/api/mcp/auth_callback"));
        assert!(!policy.is_allowed("https://claude.ai/other"));
        assert!(!policy.is_allowed("http://localhost:3000/cb"));
    }

    #[test]
    fn test_check_all() {
        let policy = loopback_policy();
        assert!(policy
            .check_all(&["http://localhost:1234/a".to_string(), "http://127.0.0.1:9/b".to_string()])
            .is_ok());
        assert!(matches!(
            policy.check_all(&[
                "http://localhost:1234/a".to_string(),
                "https://outside.example/cb".to_string(),
            ]),
            Err(AuthError::InvalidRedirectUri)
        ));
        assert!(matches!(policy.check_all(&[]), Err(AuthError::InvalidRedirectUri)));
    }
}
