// ABOUTME: Bearer-token scope enforcement middleware for the resource API
// ABOUTME: Verifies tokens, checks revocation, and gates routes on scopes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::grants::GrantStore;
use crate::scopes::ScopeSet;
use crate::server::models::OAuthError;
use crate::token_codec::{TokenCodec, VerificationError};
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::sync::Arc;

/// The scope a route requires, installed per-route as an extension layer.
///
/// The extension layer must be added after the enforcement layer on the same
/// route so it runs first and the scope is visible when enforcement executes.
#[derive(Debug, Clone, Copy)]
pub struct RequiredScope(pub &'static str);

/// Authenticated request context inserted for downstream handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resource owner; `None` for client-credentials tokens
    pub subject_id: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Scopes granted to the token
    pub scopes: ScopeSet,
}

/// Shared state for the enforcement middleware
#[derive(Clone)]
pub struct ScopeEnforcementState {
    codec: Arc<TokenCodec>,
    grants: Arc<GrantStore>,
}

impl ScopeEnforcementState {
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, grants: Arc<GrantStore>) -> Self {
        Self { codec, grants }
    }
}

/// Axum middleware enforcing bearer authentication and the route's scope.
///
/// Attach with `axum::middleware::from_fn_with_state`. On success an
/// [`AuthContext`] is inserted into request extensions; failures answer with
/// 401 `invalid_token` or 403 `insufficient_scope` and a `WWW-Authenticate`
/// header, RFC 6750 style.
pub async fn enforce_scope(
    State(state): State<ScopeEnforcementState>,
    required: Option<Extension<RequiredScope>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("missing bearer token");
    };

    let claims = match state.codec.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(VerificationError::Expired) => return unauthorized("access token has expired"),
        Err(_) => return unauthorized("access token is invalid"),
    };

    match state.grants.is_access_token_revoked(&claims.jti).await {
        Ok(false) => {}
        Ok(true) => return unauthorized("access token has been revoked"),
        Err(e) => {
            tracing::error!(error = %e, "revocation check failed");
            return OAuthError::server_error().into_response();
        }
    }

    let scopes = claims.scopes();
    if let Some(Extension(RequiredScope(required))) = required {
        if !scopes.contains(required) {
            tracing::debug!(
                client_id = %claims.client_id,
                required_scope = %required,
                "request rejected for insufficient scope"
            );
            return forbidden(required);
        }
    }

    request.extensions_mut().insert(AuthContext {
        subject_id: claims.sub,
        client_id: claims.client_id,
        scopes,
    });
    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(std::string::ToString::to_string)
}

fn unauthorized(description: &str) -> Response {
    let error = OAuthError::invalid_token(description);
    let mut response = (error.status(), Json(error)).into_response();
    if let Ok(value) = format!("Bearer error=\"invalid_token\", error_description=\"{description}\"").parse()
    {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn forbidden(required_scope: &str) -> Response {
    let error =
        OAuthError::insufficient_scope(&format!("requires the {required_scope} scope"));
    let mut response = (error.status(), Json(error)).into_response();
    if let Ok(value) =
        format!("Bearer error=\"insufficient_scope\", scope=\"{required_scope}\"").parse()
    {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}
