// ABOUTME: Signed token issuance and verification for access and session tokens
// ABOUTME: HMAC-SHA256 compact tokens (HS256 JWT) over a server-held shared secret
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::errors::{AppError, AppResult};
use crate::scopes::ScopeSet;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kind discriminator embedded in every token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Bearer access token for the resource API
    Access,
    /// Resource-owner session token accepted only by the authorize endpoints
    Session,
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token identifier, used for revocation
    pub jti: String,
    /// Subject identifier; absent for client-credentials tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Token kind discriminator
    pub kind: TokenKind,
}

impl AccessClaims {
    /// Granted scopes as a set
    #[must_use]
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope)
    }
}

/// Claims carried by a resource-owner session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Stable subject identifier from the login collaborator
    pub sub: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Token kind discriminator
    pub kind: TokenKind,
}

/// Verification failures, signature checked before any claim is inspected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// Token is not a well-formed compact token, or is the wrong kind for this use
    #[error("token is malformed")]
    Malformed,
    /// Token signature verified but the expiry has passed
    #[error("token has expired")]
    Expired,
    /// Signature does not match the server secret
    #[error("token signature is invalid")]
    BadSignature,
}

/// Parameters for access token issuance
pub struct AccessTokenParams<'a> {
    /// Subject identifier; `None` for client-credentials grants
    pub subject_id: Option<&'a str>,
    /// Client the token is issued to
    pub client_id: &'a str,
    /// Granted scope set
    pub scope: &'a ScopeSet,
}

/// A freshly issued access token with its bookkeeping
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    /// The signed compact token
    pub token: String,
    /// Token identifier (for revocation)
    pub jti: String,
    /// When this token expires
    pub expires_at: DateTime<Utc>,
}

/// Creates and verifies signed tokens with a shared HMAC secret
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    session_ttl: Duration,
}

impl TokenCodec {
    /// Create a codec from raw secret bytes
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes
    pub fn new(secret: &[u8], access_ttl_secs: i64) -> AppResult<Self> {
        if secret.len() < 32 {
            return Err(AppError::config(
                "token secret must be at least 32 bytes of entropy",
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::seconds(access_ttl_secs),
            session_ttl: Duration::hours(24),
        })
    }

    /// Access token lifetime in seconds, for `expires_in` responses
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Issue a signed access token embedding subject, client, scope, and expiry
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn issue_access_token(&self, params: AccessTokenParams<'_>) -> AppResult<IssuedAccessToken> {
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = AccessClaims {
            jti: jti.clone(),
            sub: params.subject_id.map(std::string::ToString::to_string),
            client_id: params.client_id.to_string(),
            scope: params.scope.to_scope_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            kind: TokenKind::Access,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign access token: {e}")))?;

        Ok(IssuedAccessToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Issue a session token for an authenticated resource owner.
    ///
    /// Minted by the login collaborator after credential verification; accepted
    /// only by the authorize endpoints, never by the resource middleware.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn issue_session_token(&self, subject_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.session_ttl).timestamp(),
            kind: TokenKind::Session,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign session token: {e}")))
    }

    /// Verify an access token and return its claims.
    ///
    /// The signature is checked before any claim is inspected; a session token
    /// presented here is rejected as malformed.
    ///
    /// # Errors
    /// Returns `Malformed`, `Expired`, or `BadSignature`
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, VerificationError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(VerificationError::Malformed);
        }
        Ok(claims)
    }

    /// Verify a session token and return its claims
    ///
    /// # Errors
    /// Returns `Malformed`, `Expired`, or `BadSignature`
    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims, VerificationError> {
        let claims: SessionClaims = self.decode(token)?;
        if claims.kind != TokenKind::Session {
            return Err(VerificationError::Malformed);
        }
        Ok(claims)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, VerificationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => VerificationError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    VerificationError::BadSignature
                }
                _ => VerificationError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&[7u8; 32], 3600).unwrap()
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let codec = codec();
        let scope = ScopeSet::parse("wallet:accounts:read");
        let issued = codec
            .issue_access_token(AccessTokenParams {
                subject_id: Some("user-42"),
                client_id: "wallet_client_abc",
                scope: &scope,
            })
            .unwrap();

        let claims = codec.verify_access_token(&issued.token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-42"));
        assert_eq!(claims.client_id, "wallet_client_abc");
        assert_eq!(claims.scope, "wallet:accounts:read");
        assert_eq!(claims.jti, issued.jti);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let codec = codec();
        let other = TokenCodec::new(&[8u8; 32], 3600).unwrap();
        let scope = ScopeSet::parse("wallet:accounts:read");
        let issued = other
            .issue_access_token(AccessTokenParams {
                subject_id: None,
                client_id: "c",
                scope: &scope,
            })
            .unwrap();

        assert_eq!(
            codec.verify_access_token(&issued.token),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(
            codec().verify_access_token("not-a-token"),
            Err(VerificationError::Malformed)
        );
    }

    #[test]
    fn test_session_token_not_accepted_as_access() {
        let codec = codec();
        let session = codec.issue_session_token("user-42").unwrap();
        assert_eq!(
            codec.verify_access_token(&session),
            Err(VerificationError::Malformed)
        );
        assert_eq!(
            codec.verify_session_token(&session).unwrap().sub,
            "user-42"
        );
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenCodec::new(&[1u8; 16], 3600).is_err());
    }
}
