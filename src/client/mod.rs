// ABOUTME: OAuth client for the tool-calling process: HTTP calls and token care
// ABOUTME: Talks to the authorization server over reqwest with rustls
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::config::OAuthClientConfig;
use crate::server::models::{OAuthError, TokenResponse};
use anyhow::{Context, Result};
use std::time::Duration;

pub mod flow;
pub mod token_manager;

pub use flow::AuthorizationAttempt;
pub use token_manager::TokenManager;

/// A token endpoint call that did not produce a token
#[derive(Debug)]
pub enum TokenCallError {
    /// The server answered with an OAuth protocol error
    Protocol(OAuthError),
    /// Transport or decoding failure
    Transport(anyhow::Error),
}

impl TokenCallError {
    /// `invalid_grant` means the presented grant is dead, not that the
    /// request was malformed; callers fall back to another grant type
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.error == "invalid_grant")
    }
}

impl std::fmt::Display for TokenCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(e) => write!(
                f,
                "token endpoint returned {}: {}",
                e.error,
                e.error_description.as_deref().unwrap_or("")
            ),
            Self::Transport(e) => write!(f, "token endpoint unreachable: {e}"),
        }
    }
}

impl std::error::Error for TokenCallError {}

/// Low-level HTTP client for the authorization server's token endpoint
pub struct AuthServerClient {
    http: reqwest::Client,
    config: OAuthClientConfig,
}

impl AuthServerClient {
    /// Build a client for the configured authorization server
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    /// The client configuration
    #[must_use]
    pub const fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, TokenCallError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("code_verifier", code_verifier),
            ("client_id", &self.config.client_id),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret));
        }
        self.token_call(&form).await
    }

    /// Rotate a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenCallError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret));
        }
        self.token_call(&form).await
    }

    /// Acquire a token with the client's own credentials
    pub async fn client_credentials(&self) -> Result<TokenResponse, TokenCallError> {
        let secret = self.config.client_secret.as_deref().ok_or_else(|| {
            TokenCallError::Transport(anyhow::anyhow!(
                "client_credentials requires a configured client secret"
            ))
        })?;
        let scope = self.config.scope.to_scope_string();
        let form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", &self.config.client_id),
            ("client_secret", secret),
            ("scope", &scope),
        ];
        self.token_call(&form).await
    }

    async fn token_call(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TokenCallError> {
        let url = format!("{}/oauth2/token", self.config.auth_base_url);
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenCallError::Transport(e.into()))?;

        if response.status().is_success() {
            response
                .json::<TokenResponse>()
                .await
                .map_err(|e| TokenCallError::Transport(e.into()))
        } else {
            let error = response
                .json::<OAuthError>()
                .await
                .map_err(|e| TokenCallError::Transport(e.into()))?;
            Err(TokenCallError::Protocol(error))
        }
    }
}
