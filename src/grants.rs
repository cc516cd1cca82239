// ABOUTME: Grant lifecycle manager over the auth store
// ABOUTME: Mints codes and refresh tokens, drives rotation and revocation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::errors::{AppError, AppResult};
use crate::scopes::ScopeSet;
use crate::store::{
    AuthStore, AuthorizationCodeRecord, ConsentRecord, GrantError, RefreshTokenRecord,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

/// Entropy in bytes for codes and refresh tokens before encoding
const GRANT_TOKEN_BYTES: usize = 32;

/// Inputs for minting an authorization code
pub struct CodeParams<'a> {
    /// Client the code is issued to
    pub client_id: &'a str,
    /// Redirect URI the code is bound to
    pub redirect_uri: &'a str,
    /// Granted scope set
    pub scope: &'a ScopeSet,
    /// Client CSRF state to echo back
    pub state: Option<&'a str>,
    /// PKCE challenge from the authorization request
    pub code_challenge: &'a str,
    /// PKCE challenge method
    pub code_challenge_method: &'a str,
    /// Approving resource owner
    pub subject_id: &'a str,
}

/// Manages the lifetimes of authorization codes and refresh tokens
pub struct GrantStore {
    store: Arc<dyn AuthStore>,
    code_ttl: Duration,
    refresh_ttl: Duration,
}

impl GrantStore {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, code_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            store,
            code_ttl: Duration::seconds(code_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    /// Mint and persist a short-lived, single-use authorization code
    ///
    /// # Errors
    /// Returns an error if random generation or storage fails
    pub async fn create_code(&self, params: CodeParams<'_>) -> AppResult<AuthorizationCodeRecord> {
        let now = Utc::now();
        let record = AuthorizationCodeRecord {
            code: generate_opaque_token()?,
            client_id: params.client_id.to_string(),
            redirect_uri: params.redirect_uri.to_string(),
            scope: params.scope.to_scope_string(),
            state: params.state.map(std::string::ToString::to_string),
            code_challenge: params.code_challenge.to_string(),
            code_challenge_method: params.code_challenge_method.to_string(),
            subject_id: params.subject_id.to_string(),
            issued_at: now,
            expires_at: now + self.code_ttl,
            consumed: false,
        };
        self.store.store_auth_code(&record).await?;
        tracing::debug!(client_id = %record.client_id, "issued authorization code");
        Ok(record)
    }

    /// Atomically consume an authorization code; one winner per code
    ///
    /// # Errors
    /// Returns a `GrantError` describing why the code cannot be redeemed
    pub async fn consume_code(&self, code: &str) -> Result<AuthorizationCodeRecord, GrantError> {
        self.store.consume_auth_code(code, Utc::now()).await
    }

    /// Mint and persist a fresh refresh token
    ///
    /// # Errors
    /// Returns an error if random generation or storage fails
    pub async fn issue_refresh_token(
        &self,
        client_id: &str,
        subject_id: Option<&str>,
        scope: &ScopeSet,
    ) -> AppResult<RefreshTokenRecord> {
        let record = self.build_refresh_token(client_id, subject_id, scope, None)?;
        self.store.store_refresh_token(&record).await?;
        Ok(record)
    }

    /// Rotate a refresh token: atomically retire the old token and persist a
    /// successor carrying the same client, subject, and scope. Returns
    /// `(old, successor)`.
    ///
    /// # Errors
    /// Returns a `GrantError` when the old token is unknown, expired, revoked,
    /// or already rotated
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
    ) -> Result<(RefreshTokenRecord, RefreshTokenRecord), GrantError> {
        // Read first to build the successor; the store re-checks atomically.
        let current = self
            .store
            .get_refresh_token(old_token)
            .await?
            .ok_or(GrantError::NotFound)?;

        let successor = self.build_refresh_token(
            &current.client_id,
            current.subject_id.as_deref(),
            &ScopeSet::parse(&current.scope),
            Some(old_token),
        )?;

        let old = self
            .store
            .rotate_refresh_token(old_token, &successor, Utc::now())
            .await?;
        tracing::debug!(client_id = %old.client_id, "rotated refresh token");
        Ok((old, successor))
    }

    /// Revoke a refresh token owned by `client_id`; returns whether a live
    /// token was revoked
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> AppResult<bool> {
        self.store.revoke_refresh_token(token, client_id).await
    }

    /// Look up a refresh token without consuming it
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        self.store.get_refresh_token(token).await
    }

    /// Add an access token id to the revocation list until its natural expiry
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn revoke_access_token(
        &self,
        jti: &str,
        client_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.store.revoke_access_token(jti, client_id, expires_at).await
    }

    /// Check the access token revocation list
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn is_access_token_revoked(&self, jti: &str) -> AppResult<bool> {
        self.store.is_access_token_revoked(jti).await
    }

    /// Record a consent decision for later prompt-skipping
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn record_consent(
        &self,
        subject_id: &str,
        client_id: &str,
        scope: &ScopeSet,
    ) -> AppResult<()> {
        self.store
            .upsert_consent(&ConsentRecord {
                subject_id: subject_id.to_string(),
                client_id: client_id.to_string(),
                granted_scope: scope.to_scope_string(),
                granted_at: Utc::now(),
            })
            .await
    }

    /// Check whether a cached consent already covers the requested scopes
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn has_consent(
        &self,
        subject_id: &str,
        client_id: &str,
        requested: &ScopeSet,
    ) -> AppResult<bool> {
        let Some(consent) = self.store.get_consent(subject_id, client_id).await? else {
            return Ok(false);
        };
        Ok(requested.is_subset(&ScopeSet::parse(&consent.granted_scope)))
    }

    /// Drop expired grants; returns the number of records removed
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn sweep_expired(&self) -> AppResult<u64> {
        self.store.sweep_expired(Utc::now()).await
    }

    fn build_refresh_token(
        &self,
        client_id: &str,
        subject_id: Option<&str>,
        scope: &ScopeSet,
        rotated_from: Option<&str>,
    ) -> AppResult<RefreshTokenRecord> {
        let now = Utc::now();
        Ok(RefreshTokenRecord {
            token: generate_opaque_token()?,
            client_id: client_id.to_string(),
            subject_id: subject_id.map(std::string::ToString::to_string),
            scope: scope.to_scope_string(),
            issued_at: now,
            expires_at: now + self.refresh_ttl,
            revoked: false,
            rotated: false,
            rotated_from: rotated_from.map(std::string::ToString::to_string),
        })
    }
}

/// Generate an opaque, URL-safe token with 256 bits of entropy
///
/// # Errors
/// Returns an error if the system RNG fails
pub fn generate_opaque_token() -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; GRANT_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::internal("failed to generate random bytes"))?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}
