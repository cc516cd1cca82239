// ABOUTME: SQLite auth store giving grants durability across restarts
// ABOUTME: Atomicity via guarded UPDATE statements and transactions
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
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// SQLite-backed auth store
pub struct SqliteAuthStore {
    pool: SqlitePool,
}

impl SqliteAuthStore {
    /// Connect and run schema setup.
    ///
    /// In-memory databases are pinned to a single connection: every pooled
    /// connection would otherwise see its own empty database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(AppError::from)?
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        // One statement per query; sqlx prepares each individually
        let statements = [
            r"CREATE TABLE IF NOT EXISTS oauth_clients (
                client_id TEXT PRIMARY KEY,
                client_secret_hash TEXT,
                redirect_uris TEXT NOT NULL,
                allowed_scopes TEXT NOT NULL,
                confidential INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            r"CREATE TABLE IF NOT EXISTS auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                state TEXT,
                code_challenge TEXT NOT NULL,
                code_challenge_method TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                consumed INTEGER NOT NULL DEFAULT 0
            )",
            r"CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                subject_id TEXT,
                scope TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0,
                rotated INTEGER NOT NULL DEFAULT 0,
                rotated_from TEXT
            )",
            r"CREATE TABLE IF NOT EXISTS revoked_access_tokens (
                jti TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            r"CREATE TABLE IF NOT EXISTS consents (
                subject_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                granted_scope TEXT NOT NULL,
                granted_at TEXT NOT NULL,
                PRIMARY KEY (subject_id, client_id)
            )",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn client_from_row(row: &SqliteRow) -> AppResult<OAuthClientRecord> {
        let redirect_uris_json: String = row.try_get("redirect_uris").map_err(AppError::from)?;
        Ok(OAuthClientRecord {
            client_id: row.try_get("client_id").map_err(AppError::from)?,
            client_secret_hash: row.try_get("client_secret_hash").map_err(AppError::from)?,
            redirect_uris: serde_json::from_str(&redirect_uris_json)?,
            allowed_scopes: row.try_get("allowed_scopes").map_err(AppError::from)?,
            confidential: row.try_get("confidential").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }

    fn code_from_row(row: &SqliteRow) -> AppResult<AuthorizationCodeRecord> {
        Ok(AuthorizationCodeRecord {
            code: row.try_get("code").map_err(AppError::from)?,
            client_id: row.try_get("client_id").map_err(AppError::from)?,
            redirect_uri: row.try_get("redirect_uri").map_err(AppError::from)?,
            scope: row.try_get("scope").map_err(AppError::from)?,
            state: row.try_get("state").map_err(AppError::from)?,
            code_challenge: row.try_get("code_challenge").map_err(AppError::from)?,
            code_challenge_method: row
                .try_get("code_challenge_method")
                .map_err(AppError::from)?,
            subject_id: row.try_get("subject_id").map_err(AppError::from)?,
            issued_at: row.try_get("issued_at").map_err(AppError::from)?,
            expires_at: row.try_get("expires_at").map_err(AppError::from)?,
            consumed: row.try_get("consumed").map_err(AppError::from)?,
        })
    }

    fn refresh_from_row(row: &SqliteRow) -> AppResult<RefreshTokenRecord> {
        Ok(RefreshTokenRecord {
            token: row.try_get("token").map_err(AppError::from)?,
            client_id: row.try_get("client_id").map_err(AppError::from)?,
            subject_id: row.try_get("subject_id").map_err(AppError::from)?,
            scope: row.try_get("scope").map_err(AppError::from)?,
            issued_at: row.try_get("issued_at").map_err(AppError::from)?,
            expires_at: row.try_get("expires_at").map_err(AppError::from)?,
            revoked: row.try_get("revoked").map_err(AppError::from)?,
            rotated: row.try_get("rotated").map_err(AppError::from)?,
            rotated_from: row.try_get("rotated_from").map_err(AppError::from)?,
        })
    }
}

#[async_trait]
impl AuthStore for SqliteAuthStore {
    async fn store_client(&self, client: &OAuthClientRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO oauth_clients \
             (client_id, client_secret_hash, redirect_uris, allowed_scopes, confidential, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(&client.allowed_scopes)
        .bind(client.confidential)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClientRecord>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::client_from_row).transpose()
    }

    async fn update_client_secret(&self, client_id: &str, secret_hash: &str) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE oauth_clients SET client_secret_hash = ? WHERE client_id = ?")
                .bind(secret_hash)
                .bind(client_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("OAuth client"));
        }
        Ok(())
    }

    async fn store_auth_code(&self, code: &AuthorizationCodeRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO auth_codes \
             (code, client_id, redirect_uri, scope, state, code_challenge, code_challenge_method, \
              subject_id, issued_at, expires_at, consumed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.state)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.subject_id)
        .bind(code.issued_at)
        .bind(code.expires_at)
        .bind(code.consumed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCodeRecord, GrantError> {
        // Guarded update: at most one concurrent exchange flips `consumed`
        let result =
            sqlx::query("UPDATE auth_codes SET consumed = 1 WHERE code = ? AND consumed = 0 AND expires_at > ?")
                .bind(code)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(AppError::from)?;

        let row = sqlx::query("SELECT * FROM auth_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        if result.rows_affected() == 1 {
            let row = row.ok_or(GrantError::NotFound)?;
            return Ok(Self::code_from_row(&row)?);
        }

        // Losing path: classify why the guard failed
        let Some(row) = row else {
            return Err(GrantError::NotFound);
        };
        let record = Self::code_from_row(&row)?;
        if record.expires_at <= now && !record.consumed {
            Err(GrantError::Expired)
        } else {
            Err(GrantError::AlreadyConsumed)
        }
    }

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (token, client_id, subject_id, scope, issued_at, expires_at, revoked, rotated, rotated_from) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(&token.client_id)
        .bind(&token.subject_id)
        .bind(&token.scope)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.rotated)
        .bind(&token.rotated_from)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> AppResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::refresh_from_row).transpose()
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, GrantError> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let result = sqlx::query(
            "UPDATE refresh_tokens SET rotated = 1 \
             WHERE token = ? AND revoked = 0 AND rotated = 0 AND expires_at > ?",
        )
        .bind(old_token)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 1 {
            let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?")
                .bind(old_token)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
            let old = Self::refresh_from_row(&row)?;

            sqlx::query(
                "INSERT INTO refresh_tokens \
                 (token, client_id, subject_id, scope, issued_at, expires_at, revoked, rotated, rotated_from) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&successor.token)
            .bind(&successor.client_id)
            .bind(&successor.subject_id)
            .bind(&successor.scope)
            .bind(successor.issued_at)
            .bind(successor.expires_at)
            .bind(successor.revoked)
            .bind(successor.rotated)
            .bind(&successor.rotated_from)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

            tx.commit().await.map_err(AppError::from)?;
            return Ok(old);
        }

        drop(tx);

        // Losing path: classify why the guard failed
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(old_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        let Some(row) = row else {
            return Err(GrantError::NotFound);
        };
        let record = Self::refresh_from_row(&row)?;
        if record.revoked {
            Err(GrantError::Revoked)
        } else if record.rotated {
            Err(GrantError::AlreadyRotated)
        } else {
            Err(GrantError::Expired)
        }
    }

    async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1 \
             WHERE token = ? AND client_id = ? AND revoked = 0",
        )
        .bind(token)
        .bind(client_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_access_token(
        &self,
        jti: &str,
        client_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO revoked_access_tokens (jti, client_id, expires_at) VALUES (?, ?, ?)",
        )
        .bind(jti)
        .bind(client_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_access_token_revoked(&self, jti: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT jti FROM revoked_access_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn upsert_consent(&self, consent: &ConsentRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO consents (subject_id, client_id, granted_scope, granted_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&consent.subject_id)
        .bind(&consent.client_id)
        .bind(&consent.granted_scope)
        .bind(consent.granted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_consent(
        &self,
        subject_id: &str,
        client_id: &str,
    ) -> AppResult<Option<ConsentRecord>> {
        let row = sqlx::query("SELECT * FROM consents WHERE subject_id = ? AND client_id = ?")
            .bind(subject_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(ConsentRecord {
                subject_id: row.try_get("subject_id").map_err(AppError::from)?,
                client_id: row.try_get("client_id").map_err(AppError::from)?,
                granted_scope: row.try_get("granted_scope").map_err(AppError::from)?,
                granted_at: row.try_get("granted_at").map_err(AppError::from)?,
            })
        })
        .transpose()
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut removed = 0u64;
        removed += sqlx::query("DELETE FROM auth_codes WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        removed += sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        removed += sqlx::query("DELETE FROM revoked_access_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }
}
