// ABOUTME: Authorization code flow bookkeeping for the embedded OAuth client
// ABOUTME: One attempt holds its state and PKCE verifier until the callback
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::config::OAuthClientConfig;
use crate::pkce::PkceParams;
use rand::Rng;

/// Length of the generated CSRF state parameter
const STATE_LENGTH: usize = 32;

/// A single in-flight authorization attempt.
///
/// The state and code verifier are bound to exactly one attempt; a callback
/// whose state does not match exactly must be rejected.
#[derive(Debug, Clone)]
pub struct AuthorizationAttempt {
    /// URL to send the resource owner's browser to
    pub authorize_url: String,
    /// CSRF state expected back on the callback
    pub state: String,
    /// PKCE verifier to present at the code exchange
    pub code_verifier: String,
}

impl AuthorizationAttempt {
    /// Start a fresh attempt with new state and PKCE parameters
    #[must_use]
    pub fn begin(config: &OAuthClientConfig) -> Self {
        let state = generate_state();
        let pkce = PkceParams::generate();

        let scope = config.scope.to_scope_string();
        let authorize_url = format!(
            "{}/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method={}",
            config.auth_base_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&state),
            urlencoding::encode(&pkce.code_challenge),
            pkce.code_challenge_method,
        );

        Self {
            authorize_url,
            state,
            code_verifier: pkce.code_verifier,
        }
    }

    /// Exact comparison against the callback's state parameter
    #[must_use]
    pub fn state_matches(&self, callback_state: &str) -> bool {
        self.state == callback_state
    }
}

fn generate_state() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..STATE_LENGTH)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::ScopeSet;

    fn config() -> OAuthClientConfig {
        OAuthClientConfig {
            auth_base_url: "http://localhost:8081".to_string(),
            client_id: "wallet_client_test".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost:3000/callback".to_string(),
            scope: ScopeSet::parse("wallet:accounts:read"),
            dev_access_token: None,
        }
    }

    #[test]
    fn test_attempt_carries_state_and_challenge() {
        let attempt = AuthorizationAttempt::begin(&config());
        assert!(attempt.authorize_url.contains("response_type=code"));
        assert!(attempt.authorize_url.contains("code_challenge_method=S256"));
        assert!(attempt
            .authorize_url
            .contains(&format!("state={}", attempt.state)));
        assert_eq!(attempt.state.len(), STATE_LENGTH);
    }

    #[test]
    fn test_state_comparison_is_exact() {
        let attempt = AuthorizationAttempt::begin(&config());
        assert!(attempt.state_matches(&attempt.state));
        assert!(!attempt.state_matches(&attempt.state.to_uppercase()));
        assert!(!attempt.state_matches(""));
    }

    #[test]
    fn test_attempts_are_unique() {
        let a = AuthorizationAttempt::begin(&config());
        let b = AuthorizationAttempt::begin(&config());
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
    }
}
