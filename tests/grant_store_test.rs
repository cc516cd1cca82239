// ABOUTME: Tests for grant lifecycle semantics over the in-memory store
// ABOUTME: Single-use codes, rotation chains, and concurrent exchange races
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::Arc;
use wallet_oauth::grants::{CodeParams, GrantStore};
use wallet_oauth::scopes::ScopeSet;
use wallet_oauth::store::{AuthStore, GrantError, MemoryAuthStore};

const CODE_TTL_SECS: i64 = 90;
const REFRESH_TTL_SECS: i64 = 30 * 24 * 3600;

fn grant_store() -> GrantStore {
    GrantStore::new(
        Arc::new(MemoryAuthStore::new()),
        CODE_TTL_SECS,
        REFRESH_TTL_SECS,
    )
}

fn code_params<'a>(scope: &'a ScopeSet, challenge: &'a str) -> CodeParams<'a> {
    CodeParams {
        client_id: "wallet_client_test",
        redirect_uri: "http://localhost:3000/callback",
        scope,
        state: Some("xyz"),
        code_challenge: challenge,
        code_challenge_method: "S256",
        subject_id: "user-1",
    }
}

// =============================================================================
// Authorization Code Tests
// =============================================================================

#[tokio::test]
async fn test_code_is_single_use() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let record = grants
        .create_code(code_params(&scope, "challenge"))
        .await
        .unwrap();

    let first = grants.consume_code(&record.code).await;
    assert!(first.is_ok());

    let second = grants.consume_code(&record.code).await;
    assert!(matches!(second, Err(GrantError::AlreadyConsumed)));
}

#[tokio::test]
async fn test_unknown_code_not_found() {
    let grants = grant_store();
    assert!(matches!(
        grants.consume_code("no-such-code").await,
        Err(GrantError::NotFound)
    ));
}

#[tokio::test]
async fn test_expired_code_rejected() {
    // Zero TTL makes the code already expired when consumed
    let grants = GrantStore::new(Arc::new(MemoryAuthStore::new()), 0, REFRESH_TTL_SECS);
    let scope = ScopeSet::parse("wallet:accounts:read");
    let record = grants
        .create_code(code_params(&scope, "challenge"))
        .await
        .unwrap();

    assert!(matches!(
        grants.consume_code(&record.code).await,
        Err(GrantError::Expired)
    ));
}

#[tokio::test]
async fn test_consumed_code_keeps_bound_data() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let record = grants
        .create_code(code_params(&scope, "the-challenge"))
        .await
        .unwrap();

    let consumed = grants.consume_code(&record.code).await.unwrap();
    assert_eq!(consumed.client_id, "wallet_client_test");
    assert_eq!(consumed.redirect_uri, "http://localhost:3000/callback");
    assert_eq!(consumed.code_challenge, "the-challenge");
    assert_eq!(consumed.subject_id, "user-1");
    assert!(consumed.consumed);
}

#[tokio::test]
async fn test_concurrent_exchange_single_winner() {
    let grants = Arc::new(grant_store());
    let scope = ScopeSet::parse("wallet:accounts:read");
    let record = grants
        .create_code(code_params(&scope, "challenge"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let grants = grants.clone();
        let code = record.code.clone();
        handles.push(tokio::spawn(
            async move { grants.consume_code(&code).await },
        ));
    }

    let mut winners = 0;
    let mut already_consumed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(GrantError::AlreadyConsumed) => already_consumed += 1,
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(already_consumed, 15);
}

// =============================================================================
// Refresh Token Rotation Tests
// =============================================================================

#[tokio::test]
async fn test_rotation_invalidates_predecessor() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let original = grants
        .issue_refresh_token("wallet_client_test", Some("user-1"), &scope)
        .await
        .unwrap();

    let (old, successor) = grants.rotate_refresh_token(&original.token).await.unwrap();
    assert_eq!(old.token, original.token);
    assert_eq!(successor.rotated_from.as_deref(), Some(original.token.as_str()));
    assert_eq!(successor.scope, original.scope);
    assert_eq!(successor.subject_id, original.subject_id);

    // The predecessor is dead
    assert!(matches!(
        grants.rotate_refresh_token(&original.token).await,
        Err(GrantError::AlreadyRotated)
    ));

    // The successor still rotates
    assert!(grants.rotate_refresh_token(&successor.token).await.is_ok());
}

#[tokio::test]
async fn test_rotation_chain_each_link_single_use() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let mut current = grants
        .issue_refresh_token("wallet_client_test", Some("user-1"), &scope)
        .await
        .unwrap()
        .token;

    let mut chain = vec![current.clone()];
    for _ in 0..5 {
        let (_, successor) = grants.rotate_refresh_token(&current).await.unwrap();
        current = successor.token;
        chain.push(current.clone());
    }

    // Every retired link refuses rotation
    for dead in &chain[..chain.len() - 1] {
        assert!(matches!(
            grants.rotate_refresh_token(dead).await,
            Err(GrantError::AlreadyRotated)
        ));
    }
}

#[tokio::test]
async fn test_revoked_token_cannot_rotate() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let token = grants
        .issue_refresh_token("wallet_client_test", Some("user-1"), &scope)
        .await
        .unwrap();

    assert!(grants
        .revoke_refresh_token(&token.token, "wallet_client_test")
        .await
        .unwrap());
    assert!(matches!(
        grants.rotate_refresh_token(&token.token).await,
        Err(GrantError::Revoked)
    ));
}

#[tokio::test]
async fn test_revocation_requires_owning_client() {
    let grants = grant_store();
    let scope = ScopeSet::parse("wallet:accounts:read");
    let token = grants
        .issue_refresh_token("wallet_client_test", Some("user-1"), &scope)
        .await
        .unwrap();

    // Another client cannot revoke it
    assert!(!grants
        .revoke_refresh_token(&token.token, "wallet_client_other")
        .await
        .unwrap());
    assert!(grants.rotate_refresh_token(&token.token).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_rotation_single_winner() {
    let grants = Arc::new(grant_store());
    let scope = ScopeSet::parse("wallet:accounts:read");
    let token = grants
        .issue_refresh_token("wallet_client_test", Some("user-1"), &scope)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let grants = grants.clone();
        let token = token.token.clone();
        handles.push(tokio::spawn(async move {
            grants.rotate_refresh_token(&token).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

// =============================================================================
// Consent Cache and Sweep Tests
// =============================================================================

#[tokio::test]
async fn test_consent_covers_subset_requests() {
    let grants = grant_store();
    let granted = ScopeSet::parse("wallet:accounts:read wallet:transactions:read");
    grants
        .record_consent("user-1", "wallet_client_test", &granted)
        .await
        .unwrap();

    let narrower = ScopeSet::parse("wallet:accounts:read");
    let wider = ScopeSet::parse("wallet:accounts:read wallet:goals:write");

    assert!(grants
        .has_consent("user-1", "wallet_client_test", &narrower)
        .await
        .unwrap());
    assert!(!grants
        .has_consent("user-1", "wallet_client_test", &wider)
        .await
        .unwrap());
    assert!(!grants
        .has_consent("user-2", "wallet_client_test", &narrower)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_sweep_removes_expired_grants() {
    let store = Arc::new(MemoryAuthStore::new());
    let expired = GrantStore::new(store.clone(), 0, 0);
    let live = GrantStore::new(store.clone(), CODE_TTL_SECS, REFRESH_TTL_SECS);
    let scope = ScopeSet::parse("wallet:accounts:read");

    expired
        .create_code(code_params(&scope, "challenge"))
        .await
        .unwrap();
    expired
        .issue_refresh_token("wallet_client_test", None, &scope)
        .await
        .unwrap();
    let kept = live
        .issue_refresh_token("wallet_client_test", None, &scope)
        .await
        .unwrap();

    let removed = live.sweep_expired().await.unwrap();
    assert_eq!(removed, 2);
    assert!(store
        .get_refresh_token(&kept.token)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_sweep_tolerates_concurrent_inserts() {
    // Zero TTLs: every grant is expired the moment it lands, so repeated
    // sweeps race against the inserter on the same maps
    let grants = Arc::new(GrantStore::new(Arc::new(MemoryAuthStore::new()), 0, 0));
    let scope = ScopeSet::parse("wallet:accounts:read");

    for _ in 0..8 {
        grants
            .create_code(code_params(&scope, "challenge"))
            .await
            .unwrap();
    }

    let inserter = {
        let grants = grants.clone();
        tokio::spawn(async move {
            let scope = ScopeSet::parse("wallet:accounts:read");
            for _ in 0..64 {
                grants
                    .issue_refresh_token("wallet_client_test", None, &scope)
                    .await
                    .unwrap();
            }
        })
    };

    // Sweeps interleaved with inserts must never panic or error
    for _ in 0..16 {
        grants.sweep_expired().await.unwrap();
    }
    inserter.await.unwrap();
    grants.sweep_expired().await.unwrap();
}
