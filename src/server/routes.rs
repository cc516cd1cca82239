// ABOUTME: HTTP route handlers and router assembly for the authorization server
// ABOUTME: Axum extractors at the edge, protocol logic delegated to endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::server::endpoints::{AuthorizationServer, AuthorizeOutcome};
use crate::server::models::{
    AuthorizeRequest, ClientRegistrationRequest, ConsentSubmission, IntrospectionRequest,
    OAuthError, RevocationRequest, TokenGrant, TokenRequest,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Session cookie name set by the login collaborator
const SESSION_COOKIE: &str = "wallet_session";

/// Build the authorization server router
pub fn oauth2_routes(server: Arc<AuthorizationServer>) -> Router {
    Router::new()
        .route("/oauth2/authorize", get(authorize).post(submit_consent))
        .route("/oauth2/token", post(token))
        .route("/oauth2/register", post(register))
        .route("/oauth2/revoke", post(revoke))
        .route("/oauth2/introspect", post(introspect))
        .route("/oauth2/userinfo", get(userinfo))
        .route("/oauth2/jwks", get(jwks))
        .route("/.well-known/oauth-authorization-server", get(discovery))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn authorize(
    State(server): State<Arc<AuthorizationServer>>,
    Query(request): Query<AuthorizeRequest>,
    headers: HeaderMap,
) -> Response {
    let session = session_token(&headers);
    let outcome = server.authorize(request, session.as_deref()).await;
    match outcome {
        // Browser flow: the issued code travels on the redirect
        AuthorizeOutcome::Issued(response) => Redirect::to(&response.redirect_to).into_response(),
        other => outcome_response(other),
    }
}

async fn submit_consent(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let submission: ConsentSubmission = match parse_body(&headers, &body) {
        Ok(submission) => submission,
        Err(e) => return e.into_response(),
    };
    let session = session_token(&headers);
    let outcome = server.submit_consent(submission, session.as_deref()).await;
    match outcome {
        // Programmatic flow: the consent page follows redirect_to itself
        AuthorizeOutcome::Issued(response) => Json(response).into_response(),
        other => outcome_response(other),
    }
}

fn outcome_response(outcome: AuthorizeOutcome) -> Response {
    match outcome {
        AuthorizeOutcome::Issued(response) => Redirect::to(&response.redirect_to).into_response(),
        AuthorizeOutcome::RedirectToLogin(url)
        | AuthorizeOutcome::RedirectToConsent(url)
        | AuthorizeOutcome::RedirectWithError(url) => Redirect::to(&url).into_response(),
        AuthorizeOutcome::Error(error) => error.into_response(),
    }
}

async fn token(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request: TokenRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    apply_basic_auth(&headers, &mut request);

    let grant = match TokenGrant::try_from(request) {
        Ok(grant) => grant,
        Err(e) => return e.into_response(),
    };
    match server.token(grant).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn register(
    State(server): State<Arc<AuthorizationServer>>,
    Json(request): Json<ClientRegistrationRequest>,
) -> Response {
    match server.register(request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn revoke(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: RevocationRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    match server.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn introspect(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: IntrospectionRequest = match parse_body(&headers, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    match server.introspect(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn userinfo(
    State(server): State<Arc<AuthorizationServer>>,
    headers: HeaderMap,
) -> Response {
    let Some(bearer) = bearer_token(&headers) else {
        return OAuthError::invalid_token("missing bearer token").into_response();
    };
    match server.userinfo(&bearer).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn jwks() -> Response {
    // Tokens are HMAC-signed with a shared secret; there is no public key set
    Json(json!({ "keys": [] })).into_response()
}

async fn discovery(State(server): State<Arc<AuthorizationServer>>) -> Response {
    Json(server.discovery()).into_response()
}

/// Parse a request body as JSON or form-encoded based on Content-Type
fn parse_body<T: serde::de::DeserializeOwned>(
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, OAuthError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/x-www-form-urlencoded");

    if content_type.starts_with("application/json") {
        serde_json::from_slice(body)
            .map_err(|e| OAuthError::invalid_request(&format!("malformed JSON body: {e}")))
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| OAuthError::invalid_request(&format!("malformed form body: {e}")))
    }
}

/// Fill client credentials from an HTTP Basic Authorization header
/// (`client_secret_basic`); body parameters take precedence when present
fn apply_basic_auth(headers: &HeaderMap, request: &mut TokenRequest) {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return;
    };
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return;
    };
    if let Some((client_id, client_secret)) = pair.split_once(':') {
        if request.client_id.is_none() {
            request.client_id = Some(client_id.to_string());
        }
        if request.client_secret.is_none() {
            request.client_secret = Some(client_secret.to_string());
        }
    }
}

/// Extract the resource-owner session token from the `wallet_session` cookie
/// or a bearer Authorization header
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == SESSION_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    bearer_token(headers)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(std::string::ToString::to_string)
}
