// ABOUTME: Persistence abstraction for OAuth grants, clients, and consents
// ABOUTME: Arena keyed by opaque IDs with compare-and-set update semantics
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// In-memory backend (DashMap, per-record shard locking)
pub mod memory;
/// SQLite backend (sqlx, guarded updates and transactions)
pub mod sqlite;

pub use memory::MemoryAuthStore;
pub use sqlite::SqliteAuthStore;

/// A registered OAuth client as persisted
#[derive(Debug, Clone)]
pub struct OAuthClientRecord {
    /// Public client identifier
    pub client_id: String,
    /// Argon2id hash of the client secret; `None` for public clients
    pub client_secret_hash: Option<String>,
    /// Exact-match redirect URIs
    pub redirect_uris: Vec<String>,
    /// Space-separated scopes this client may be granted
    pub allowed_scopes: String,
    /// Whether the client authenticates with a secret
    pub confidential: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// A single-use authorization code bound to its PKCE challenge
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    /// The opaque code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI the code was issued for; must match at exchange
    pub redirect_uri: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// Client CSRF state, echoed on the redirect
    pub state: Option<String>,
    /// PKCE code challenge (base64url SHA-256 of the verifier)
    pub code_challenge: String,
    /// PKCE challenge method, always "S256"
    pub code_challenge_method: String,
    /// Resource owner who approved the request
    pub subject_id: String,
    /// Issuance time
    pub issued_at: DateTime<Utc>,
    /// Expiry; codes are short-lived
    pub expires_at: DateTime<Utc>,
    /// Set exactly once by the atomic consume
    pub consumed: bool,
}

/// A single-use, rotating refresh token
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    /// The opaque token value
    pub token: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Subject; `None` would mean no user context (never issued today)
    pub subject_id: Option<String>,
    /// Space-separated granted scopes
    pub scope: String,
    /// Issuance time
    pub issued_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Revoked via `/revoke`
    pub revoked: bool,
    /// Redeemed; a successor exists
    pub rotated: bool,
    /// Token this one was rotated from, if any
    pub rotated_from: Option<String>,
}

/// A cached consent decision used to skip re-prompting
#[derive(Debug, Clone)]
pub struct ConsentRecord {
    /// Resource owner
    pub subject_id: String,
    /// Client the consent was granted to
    pub client_id: String,
    /// Space-separated approved scopes
    pub granted_scope: String,
    /// When consent was granted
    pub granted_at: DateTime<Utc>,
}

/// Failures of grant consumption and rotation.
///
/// These carry enough detail for logging; at the token endpoint they all
/// collapse into `invalid_grant`.
#[derive(Debug, Error)]
pub enum GrantError {
    /// No record for the presented value
    #[error("grant not found")]
    NotFound,
    /// Record exists but its expiry has passed
    #[error("grant has expired")]
    Expired,
    /// Authorization code was already exchanged
    #[error("authorization code already consumed")]
    AlreadyConsumed,
    /// Refresh token was revoked
    #[error("refresh token has been revoked")]
    Revoked,
    /// Refresh token was already redeemed for a successor
    #[error("refresh token already rotated")]
    AlreadyRotated,
    /// Backend failure
    #[error(transparent)]
    Storage(#[from] AppError),
}

/// Storage backend for the authorization server.
///
/// All mutating operations are serializable per record: `consume_auth_code`
/// and `rotate_refresh_token` guarantee exactly one winner under concurrent
/// attempts, via compare-and-set in memory or guarded updates in SQLite.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // -- clients -----------------------------------------------------------

    /// Persist a newly registered client
    async fn store_client(&self, client: &OAuthClientRecord) -> AppResult<()>;

    /// Look up a client by id
    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClientRecord>>;

    /// Replace a client's secret hash (explicit rotation only)
    async fn update_client_secret(&self, client_id: &str, secret_hash: &str) -> AppResult<()>;

    // -- authorization codes ----------------------------------------------

    /// Persist a fresh authorization code
    async fn store_auth_code(&self, code: &AuthorizationCodeRecord) -> AppResult<()>;

    /// Atomically consume an authorization code.
    ///
    /// Exactly one concurrent caller observes success; the rest see
    /// `AlreadyConsumed`. Validation of client and redirect URI happens after
    /// the consume — a downstream failure never un-consumes.
    async fn consume_auth_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCodeRecord, GrantError>;

    // -- refresh tokens ----------------------------------------------------

    /// Persist a fresh refresh token
    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> AppResult<()>;

    /// Look up a refresh token (introspection path, no state change)
    async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>>;

    /// Atomically rotate a refresh token: mark the predecessor redeemed and
    /// persist its successor in the same transaction. Returns the predecessor
    /// record on success.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, GrantError>;

    /// Mark a refresh token revoked; returns true if a live token owned by
    /// `client_id` was revoked
    async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> AppResult<bool>;

    // -- access token revocation list -------------------------------------

    /// Record an access token id as revoked until its natural expiry
    async fn revoke_access_token(
        &self,
        jti: &str,
        client_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Check the revocation list
    async fn is_access_token_revoked(&self, jti: &str) -> AppResult<bool>;

    // -- consents ----------------------------------------------------------

    /// Insert or replace a consent decision
    async fn upsert_consent(&self, consent: &ConsentRecord) -> AppResult<()>;

    /// Fetch the cached consent for a subject/client pair
    async fn get_consent(
        &self,
        subject_id: &str,
        client_id: &str,
    ) -> AppResult<Option<ConsentRecord>>;

    // -- hygiene -----------------------------------------------------------

    /// Drop expired codes, refresh tokens, and revocation entries.
    /// Needed only for storage hygiene, never for correctness.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
