// ABOUTME: In-memory auth store backed by DashMap for tests and single-node use
// ABOUTME: Shard write locks give per-record compare-and-set semantics
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use super::{
    AuthStore, AuthorizationCodeRecord, ConsentRecord, GrantError, OAuthClientRecord,
    RefreshTokenRecord,
};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-memory store; all maps are keyed by the opaque record id
#[derive(Default)]
pub struct MemoryAuthStore {
    clients: DashMap<String, OAuthClientRecord>,
    auth_codes: DashMap<String, AuthorizationCodeRecord>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    /// jti -> natural expiry of the revoked access token
    revoked_access: DashMap<String, DateTime<Utc>>,
    /// (subject_id, client_id) -> consent
    consents: DashMap<(String, String), ConsentRecord>,
}

impl MemoryAuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn store_client(&self, client: &OAuthClientRecord) -> AppResult<()> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClientRecord>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn update_client_secret(&self, client_id: &str, secret_hash: &str) -> AppResult<()> {
        let mut client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| AppError::not_found("OAuth client"))?;
        client.client_secret_hash = Some(secret_hash.to_string());
        Ok(())
    }

    async fn store_auth_code(&self, code: &AuthorizationCodeRecord) -> AppResult<()> {
        self.auth_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCodeRecord, GrantError> {
        // get_mut holds the shard write lock, making check-then-set atomic
        let mut entry = self.auth_codes.get_mut(code).ok_or(GrantError::NotFound)?;
        if entry.consumed {
            return Err(GrantError::AlreadyConsumed);
        }
        if entry.expires_at <= now {
            return Err(GrantError::Expired);
        }
        entry.consumed = true;
        Ok(entry.clone())
    }

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> AppResult<()> {
        self.refresh_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(token).map(|t| t.clone()))
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, GrantError> {
        let old = {
            // Scoped so the shard lock is released before inserting the
            // successor (which may land in the same shard).
            let mut entry = self
                .refresh_tokens
                .get_mut(old_token)
                .ok_or(GrantError::NotFound)?;
            if entry.revoked {
                return Err(GrantError::Revoked);
            }
            if entry.rotated {
                return Err(GrantError::AlreadyRotated);
            }
            if entry.expires_at <= now {
                return Err(GrantError::Expired);
            }
            entry.rotated = true;
            entry.clone()
        };

        // Only the single rotation winner reaches this insert
        self.refresh_tokens
            .insert(successor.token.clone(), successor.clone());
        Ok(old)
    }

    async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> AppResult<bool> {
        if let Some(mut entry) = self.refresh_tokens.get_mut(token) {
            if entry.client_id == client_id && !entry.revoked {
                entry.revoked = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn revoke_access_token(
        &self,
        jti: &str,
        _client_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.revoked_access.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_access_token_revoked(&self, jti: &str) -> AppResult<bool> {
        Ok(self.revoked_access.contains_key(jti))
    }

    async fn upsert_consent(&self, consent: &ConsentRecord) -> AppResult<()> {
        self.consents.insert(
            (consent.subject_id.clone(), consent.client_id.clone()),
            consent.clone(),
        );
        Ok(())
    }

    async fn get_consent(
        &self,
        subject_id: &str,
        client_id: &str,
    ) -> AppResult<Option<ConsentRecord>> {
        Ok(self
            .consents
            .get(&(subject_id.to_string(), client_id.to_string()))
            .map(|c| c.clone()))
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        // Count inside retain: a before/after len() diff would race with
        // concurrent inserts landing between the shard passes
        let mut removed = 0u64;

        self.auth_codes.retain(|_, code| {
            let keep = code.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.refresh_tokens.retain(|_, token| {
            let keep = token.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.revoked_access.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}
