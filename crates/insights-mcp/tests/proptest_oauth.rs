//! Property tests for the PKCE and redirect allow-list invariants.

use proptest::prelude::*;

use insights_mcp::server::oauth::pkce::{challenge_s256, verify_s256};
use insights_mcp::server::oauth::redirect::RedirectPolicy;

fn loopback_policy() -> RedirectPolicy {
    RedirectPolicy::new(&["http://localhost:*".to_string(), "http://127.0.0.1:*".to_string()])
        .unwrap()
}

proptest! {
    /// Every verifier validates against its own challenge.
    #[test]
    fn pkce_roundtrip(verifier in "[A-Za-z0-9._~-]{43,128}") {
        let challenge = challenge_s256(&verifier);
        prop_assert!(verify_s256(&verifier, &challenge));
    }

    /// A different verifier never validates against the challenge.
    #[test]
    fn pkce_rejects_other_verifiers(
        verifier in "[A-Za-z0-9._~-]{43,128}",
        other in "[A-Za-z0-9._~-]{43,128}",
    ) {
        prop_assume!(verifier != other);
        let challenge = challenge_s256(&verifier);
        prop_assert!(!verify_s256(&other, &challenge));
    }

    /// Challenges are always 43 base64url characters (SHA-256, unpadded).
    #[test]
    fn pkce_challenge_shape(verifier in "[A-Za-z0-9._~-]{43,128}") {
        let challenge = challenge_s256(&verifier);
        prop_assert_eq!(challenge.len(), 43);
        prop_assert!(challenge.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    /// Loopback redirect URIs are accepted on any port and path.
    #[test]
    fn redirect_loopback_any_port(port in 1u16..=u16::MAX, path in "[a-z]{1,12}") {
        let policy = loopback_policy();
        let localhost_uri = format!("http://localhost:{port}/{path}");
        let loopback_uri = format!("http://127.0.0.1:{port}/{path}");
        prop_assert!(policy.is_allowed(&localhost_uri));
        prop_assert!(policy.is_allowed(&loopback_uri));
    }

    /// Non-loopback hosts never match the loopback patterns.
    #[test]
    fn redirect_foreign_hosts_rejected(
        host in "[a-z]{3,12}",
        port in 1u16..=u16::MAX,
    ) {
        prop_assume!(host != "localhost");
        let policy = loopback_policy();
        let foreign_uri = format!("http://{host}.example:{port}/cb");
        prop_assert!(!policy.is_allowed(&foreign_uri));
    }

    /// Userinfo tricks never sneak a foreign host past the allow-list.
    #[test]
    fn redirect_userinfo_rejected(user in "[a-z]{1,8}", host in "[a-z]{3,12}") {
        let policy = loopback_policy();
        let userinfo_uri = format!("http://localhost:{user}@{host}.example/cb");
        prop_assert!(!policy.is_allowed(&userinfo_uri));
    }
}
