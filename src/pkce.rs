// ABOUTME: PKCE (RFC 7636) code challenge generation and verification
// ABOUTME: S256 only; plain method is rejected for security reasons
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of generated code verifiers (RFC 7636 allows 43-128)
const CODE_VERIFIER_LENGTH: usize = 64;

/// The only supported challenge method
pub const METHOD_S256: &str = "S256";

/// PKCE parameters for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Randomly generated code verifier (43-128 characters)
    pub code_verifier: String,
    /// SHA-256 hash of the verifier, base64url encoded
    pub code_challenge: String,
    /// Challenge method (always "S256")
    pub code_challenge_method: String,
}

impl PkceParams {
    /// Generate PKCE parameters with the `S256` challenge method
    #[must_use]
    pub fn generate() -> Self {
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..CODE_VERIFIER_LENGTH)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect();

        let code_challenge = compute_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: METHOD_S256.into(),
        }
    }
}

/// Compute the S256 challenge for a verifier
#[must_use]
pub fn compute_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Check verifier format per RFC 7636 Section 4.1: 43-128 characters,
/// unreserved characters only
#[must_use]
pub fn is_valid_verifier_format(code_verifier: &str) -> bool {
    if code_verifier.len() < 43 || code_verifier.len() > 128 {
        return false;
    }
    code_verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
}

/// Verify a code verifier against a stored challenge.
///
/// Only `S256` is accepted; any other method (including `plain`) fails closed.
/// The comparison is constant-time to prevent timing attacks.
#[must_use]
pub fn verify_challenge(code_verifier: &str, code_challenge: &str, method: &str) -> bool {
    if method != METHOD_S256 {
        return false;
    }
    if !is_valid_verifier_format(code_verifier) {
        return false;
    }

    let computed = compute_challenge(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_params_verify() {
        let pkce = PkceParams::generate();
        assert_eq!(pkce.code_challenge_method, "S256");
        assert!(verify_challenge(
            &pkce.code_verifier,
            &pkce.code_challenge,
            "S256"
        ));
    }

    #[test]
    fn test_wrong_verifier_rejected() {
        let pkce = PkceParams::generate();
        let other = PkceParams::generate();
        assert!(!verify_challenge(
            &other.code_verifier,
            &pkce.code_challenge,
            "S256"
        ));
    }

    #[test]
    fn test_plain_method_fails_closed() {
        // Even an exact match must not pass with the plain method
        let verifier = "a".repeat(43);
        assert!(!verify_challenge(&verifier, &verifier, "plain"));
        assert!(!verify_challenge(&verifier, &verifier, "s256"));
    }

    #[test]
    fn test_verifier_format_bounds() {
        assert!(!is_valid_verifier_format(&"a".repeat(42)));
        assert!(is_valid_verifier_format(&"a".repeat(43)));
        assert!(is_valid_verifier_format(&"a".repeat(128)));
        assert!(!is_valid_verifier_format(&"a".repeat(129)));
        assert!(!is_valid_verifier_format(&format!("{}!", "a".repeat(43))));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        // Test vector from RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(compute_challenge(verifier), challenge);
        assert!(verify_challenge(verifier, challenge, "S256"));
    }
}
