// ABOUTME: Tests for the SQLite auth store backend
// ABOUTME: Atomic consume/rotate guards and durability across reconnects
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::{Duration, Utc};
use wallet_oauth::store::{
    AuthStore, AuthorizationCodeRecord, GrantError, OAuthClientRecord, RefreshTokenRecord,
    SqliteAuthStore,
};

fn client_record(client_id: &str) -> OAuthClientRecord {
    OAuthClientRecord {
        client_id: client_id.to_string(),
        client_secret_hash: Some("$argon2id$stub".to_string()),
        redirect_uris: vec!["http://localhost:3000/callback".to_string()],
        allowed_scopes: "wallet:accounts:read wallet:goals:read".to_string(),
        confidential: true,
        created_at: Utc::now(),
    }
}

fn code_record(code: &str, ttl_secs: i64) -> AuthorizationCodeRecord {
    let now = Utc::now();
    AuthorizationCodeRecord {
        code: code.to_string(),
        client_id: "wallet_client_test".to_string(),
        redirect_uri: "http://localhost:3000/callback".to_string(),
        scope: "wallet:accounts:read".to_string(),
        state: Some("xyz".to_string()),
        code_challenge: "challenge".to_string(),
        code_challenge_method: "S256".to_string(),
        subject_id: "user-1".to_string(),
        issued_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        consumed: false,
    }
}

fn refresh_record(token: &str, ttl_secs: i64) -> RefreshTokenRecord {
    let now = Utc::now();
    RefreshTokenRecord {
        token: token.to_string(),
        client_id: "wallet_client_test".to_string(),
        subject_id: Some("user-1".to_string()),
        scope: "wallet:accounts:read".to_string(),
        issued_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        revoked: false,
        rotated: false,
        rotated_from: None,
    }
}

#[tokio::test]
async fn test_client_roundtrip() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store.store_client(&client_record("c1")).await.unwrap();

    let loaded = store.get_client("c1").await.unwrap().unwrap();
    assert_eq!(loaded.client_id, "c1");
    assert_eq!(
        loaded.redirect_uris,
        vec!["http://localhost:3000/callback".to_string()]
    );
    assert!(loaded.confidential);
    assert!(store.get_client("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_client_secret() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store.store_client(&client_record("c1")).await.unwrap();

    store.update_client_secret("c1", "new-hash").await.unwrap();
    let loaded = store.get_client("c1").await.unwrap().unwrap();
    assert_eq!(loaded.client_secret_hash.as_deref(), Some("new-hash"));

    assert!(store.update_client_secret("missing", "h").await.is_err());
}

#[tokio::test]
async fn test_consume_code_is_guarded() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store.store_auth_code(&code_record("code-1", 90)).await.unwrap();

    let consumed = store.consume_auth_code("code-1", Utc::now()).await.unwrap();
    assert!(consumed.consumed);

    assert!(matches!(
        store.consume_auth_code("code-1", Utc::now()).await,
        Err(GrantError::AlreadyConsumed)
    ));
    assert!(matches!(
        store.consume_auth_code("missing", Utc::now()).await,
        Err(GrantError::NotFound)
    ));
}

#[tokio::test]
async fn test_expired_code_classified() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store.store_auth_code(&code_record("code-1", 0)).await.unwrap();

    let later = Utc::now() + Duration::seconds(1);
    assert!(matches!(
        store.consume_auth_code("code-1", later).await,
        Err(GrantError::Expired)
    ));
}

#[tokio::test]
async fn test_rotation_transactional() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store
        .store_refresh_token(&refresh_record("rt-old", 3600))
        .await
        .unwrap();

    let successor = refresh_record("rt-new", 3600);
    let old = store
        .rotate_refresh_token("rt-old", &successor, Utc::now())
        .await
        .unwrap();
    assert_eq!(old.token, "rt-old");

    // Predecessor marked rotated, successor present
    let predecessor = store.get_refresh_token("rt-old").await.unwrap().unwrap();
    assert!(predecessor.rotated);
    assert!(store.get_refresh_token("rt-new").await.unwrap().is_some());

    // Re-rotation of the dead link is classified, not retried
    assert!(matches!(
        store
            .rotate_refresh_token("rt-old", &refresh_record("rt-x", 3600), Utc::now())
            .await,
        Err(GrantError::AlreadyRotated)
    ));
}

#[tokio::test]
async fn test_rotation_failure_classification() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();

    assert!(matches!(
        store
            .rotate_refresh_token("missing", &refresh_record("s", 3600), Utc::now())
            .await,
        Err(GrantError::NotFound)
    ));

    store
        .store_refresh_token(&refresh_record("rt-revoked", 3600))
        .await
        .unwrap();
    assert!(store
        .revoke_refresh_token("rt-revoked", "wallet_client_test")
        .await
        .unwrap());
    assert!(matches!(
        store
            .rotate_refresh_token("rt-revoked", &refresh_record("s2", 3600), Utc::now())
            .await,
        Err(GrantError::Revoked)
    ));

    store
        .store_refresh_token(&refresh_record("rt-expired", 0))
        .await
        .unwrap();
    let later = Utc::now() + Duration::seconds(1);
    assert!(matches!(
        store
            .rotate_refresh_token("rt-expired", &refresh_record("s3", 3600), later)
            .await,
        Err(GrantError::Expired)
    ));
}

#[tokio::test]
async fn test_access_revocation_list() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    let expires = Utc::now() + Duration::hours(1);

    assert!(!store.is_access_token_revoked("jti-1").await.unwrap());
    store
        .revoke_access_token("jti-1", "wallet_client_test", expires)
        .await
        .unwrap();
    assert!(store.is_access_token_revoked("jti-1").await.unwrap());
}

#[tokio::test]
async fn test_sweep_expired() {
    let store = SqliteAuthStore::connect("sqlite::memory:").await.unwrap();
    store.store_auth_code(&code_record("dead", 0)).await.unwrap();
    store
        .store_refresh_token(&refresh_record("dead-rt", 0))
        .await
        .unwrap();
    store
        .store_refresh_token(&refresh_record("live-rt", 3600))
        .await
        .unwrap();

    let removed = store
        .sweep_expired(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(store.get_refresh_token("live-rt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_grants_survive_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet-oauth.db");
    let url = format!("sqlite:{}", path.display());

    {
        let store = SqliteAuthStore::connect(&url).await.unwrap();
        store.store_client(&client_record("c1")).await.unwrap();
        store
            .store_refresh_token(&refresh_record("rt-1", 3600))
            .await
            .unwrap();
    }

    let store = SqliteAuthStore::connect(&url).await.unwrap();
    assert!(store.get_client("c1").await.unwrap().is_some());
    let token = store.get_refresh_token("rt-1").await.unwrap().unwrap();

    // Rotation state is durable too
    store
        .rotate_refresh_token(&token.token, &refresh_record("rt-2", 3600), Utc::now())
        .await
        .unwrap();
    let store = SqliteAuthStore::connect(&url).await.unwrap();
    assert!(store.get_refresh_token("rt-1").await.unwrap().unwrap().rotated);
    assert!(store.get_refresh_token("rt-2").await.unwrap().is_some());
}
