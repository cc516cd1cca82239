// ABOUTME: Tests for the bearer scope enforcement middleware
// ABOUTME: End-to-end through an axum router with gated resource routes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{middleware as axum_middleware, Extension, Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceExt;
use wallet_oauth::grants::GrantStore;
use wallet_oauth::middleware::{enforce_scope, AuthContext, RequiredScope, ScopeEnforcementState};
use wallet_oauth::scopes::ScopeSet;
use wallet_oauth::store::MemoryAuthStore;
use wallet_oauth::token_codec::{AccessTokenParams, TokenCodec};

fn test_stack() -> (Arc<TokenCodec>, Arc<GrantStore>, Router) {
    let codec = Arc::new(TokenCodec::new(&[7u8; 32], 3600).unwrap());
    let grants = Arc::new(GrantStore::new(
        Arc::new(MemoryAuthStore::new()),
        90,
        30 * 24 * 3600,
    ));
    let state = ScopeEnforcementState::new(codec.clone(), grants.clone());

    async fn accounts(Extension(ctx): Extension<AuthContext>) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "subject": ctx.subject_id,
            "client_id": ctx.client_id,
        }))
    }

    // The extension layer is added after the enforcement layer so it runs
    // first and the required scope is visible during enforcement
    let router = Router::new()
        .route(
            "/accounts",
            get(accounts)
                .route_layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    enforce_scope,
                ))
                .route_layer(Extension(RequiredScope("wallet:accounts:read"))),
        )
        .route(
            "/accounts/update",
            get(accounts)
                .route_layer(axum_middleware::from_fn_with_state(state, enforce_scope))
                .route_layer(Extension(RequiredScope("wallet:accounts:write"))),
        );

    (codec, grants, router)
}

fn issue(codec: &TokenCodec, scope: &str) -> String {
    codec
        .issue_access_token(AccessTokenParams {
            subject_id: Some("user-1"),
            client_id: "wallet_client_test",
            scope: &ScopeSet::parse(scope),
        })
        .unwrap()
        .token
}

async fn call(router: &Router, path: &str, bearer: Option<&str>) -> (StatusCode, String) {
    let mut request = Request::builder().uri(path);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_valid_token_with_scope_passes() {
    let (codec, _grants, router) = test_stack();
    let token = issue(&codec, "wallet:accounts:read");

    let (status, body) = call(&router, "/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("user-1"));
    assert!(body.contains("wallet_client_test"));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (_codec, _grants, router) = test_stack();
    let (status, body) = call(&router, "/accounts", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("invalid_token"));
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let (_codec, _grants, router) = test_stack();
    let (status, body) = call(&router, "/accounts", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("invalid_token"));
}

#[tokio::test]
async fn test_wrong_secret_token_is_unauthorized() {
    let (_codec, _grants, router) = test_stack();
    let other = TokenCodec::new(&[9u8; 32], 3600).unwrap();
    let token = issue(&other, "wallet:accounts:read");

    let (status, _) = call(&router, "/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_token_rejected_by_middleware() {
    let (codec, _grants, router) = test_stack();
    let session = codec.issue_session_token("user-1").unwrap();

    let (status, _) = call(&router, "/accounts", Some(&session)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_read_scope_rejected_on_write_route() {
    let (codec, _grants, router) = test_stack();
    let token = issue(&codec, "wallet:accounts:read");

    let (status, body) = call(&router, "/accounts/update", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("insufficient_scope"));
    // The missing scope is named
    assert!(body.contains("wallet:accounts:write"));
}

#[tokio::test]
async fn test_wider_scope_passes_both_routes() {
    let (codec, _grants, router) = test_stack();
    let token = issue(&codec, "wallet:accounts:read wallet:accounts:write");

    assert_eq!(call(&router, "/accounts", Some(&token)).await.0, StatusCode::OK);
    assert_eq!(
        call(&router, "/accounts/update", Some(&token)).await.0,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_approved_read_token_rejected_on_write_route_end_to_end() {
    use wallet_oauth::config::ServerConfig;
    use wallet_oauth::pkce::PkceParams;
    use wallet_oauth::server::models::{
        AuthorizeRequest, ClientRegistrationRequest, ConsentSubmission, TokenGrant,
    };
    use wallet_oauth::server::{AuthorizationServer, AuthorizeOutcome};

    // Same signing secret as the middleware stack
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        http_port: 0,
        issuer_url: "http://localhost:8081".to_string(),
        token_secret: vec![7u8; 32],
        database_url: "memory".to_string(),
        login_url: "http://localhost:3000/login".to_string(),
        consent_url: "http://localhost:3000/consent".to_string(),
        supported_scopes: ScopeSet::parse("wallet:accounts:read wallet:accounts:write"),
        access_token_ttl_secs: 3600,
        auth_code_ttl_secs: 90,
        refresh_token_ttl_secs: 30 * 24 * 3600,
    };
    let server =
        AuthorizationServer::new(Arc::new(MemoryAuthStore::new()), &config).unwrap();
    let (_codec, _grants, router) = test_stack();

    let client_id = server
        .register(ClientRegistrationRequest {
            redirect_uris: vec!["http://localhost:3000/callback".to_string()],
            scope: Some("wallet:accounts:read".to_string()),
            token_endpoint_auth_method: Some("none".to_string()),
        })
        .await
        .unwrap()
        .client_id;

    let pkce = PkceParams::generate();
    let session = server.codec().issue_session_token("user-1").unwrap();
    let outcome = server
        .submit_consent(
            ConsentSubmission {
                request: AuthorizeRequest {
                    response_type: "code".to_string(),
                    client_id: client_id.clone(),
                    redirect_uri: "http://localhost:3000/callback".to_string(),
                    scope: Some("wallet:accounts:read".to_string()),
                    state: None,
                    code_challenge: Some(pkce.code_challenge.clone()),
                    code_challenge_method: Some("S256".to_string()),
                },
                approved: true,
            },
            Some(&session),
        )
        .await;
    let AuthorizeOutcome::Issued(issued) = outcome else {
        panic!("expected issued code");
    };

    let tokens = server
        .token(TokenGrant::AuthorizationCode {
            code: issued.code,
            redirect_uri: "http://localhost:3000/callback".to_string(),
            code_verifier: pkce.code_verifier,
            client_id,
            client_secret: None,
        })
        .await
        .unwrap();

    // The honestly-acquired read token works on the read route only
    let (status, _) = call(&router, "/accounts", Some(&tokens.access_token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&router, "/accounts/update", Some(&tokens.access_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("insufficient_scope"));
}

#[tokio::test]
async fn test_revoked_token_is_unauthorized() {
    let (codec, grants, router) = test_stack();
    let issued = codec
        .issue_access_token(AccessTokenParams {
            subject_id: Some("user-1"),
            client_id: "wallet_client_test",
            scope: &ScopeSet::parse("wallet:accounts:read"),
        })
        .unwrap();

    assert_eq!(
        call(&router, "/accounts", Some(&issued.token)).await.0,
        StatusCode::OK
    );

    grants
        .revoke_access_token(&issued.jti, "wallet_client_test", Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();

    let (status, body) = call(&router, "/accounts", Some(&issued.token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("revoked"));
}
