// ABOUTME: Environment-driven configuration for the server and embedded client
// ABOUTME: Validates secrets and TTL bounds at startup, before anything binds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::scopes::ScopeSet;
use std::env;

/// Upper bound on authorization code lifetime
const MAX_AUTH_CODE_TTL_SECS: i64 = 120;

/// Default scopes offered when `SUPPORTED_SCOPES` is unset
const DEFAULT_SCOPES: &str =
    "wallet:accounts:read wallet:accounts:write wallet:transactions:read wallet:goals:read wallet:goals:write";

/// Authorization server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub http_port: u16,
    /// Public issuer URL advertised in discovery metadata
    pub issuer_url: String,
    /// Raw HMAC secret for the token codec (decoded from hex)
    pub token_secret: Vec<u8>,
    /// `sqlite:...` URL, or `memory` for the in-process store
    pub database_url: String,
    /// External login page to redirect unauthenticated resource owners to
    pub login_url: String,
    /// External consent page to redirect pending authorizations to
    pub consent_url: String,
    /// Full scope set this deployment supports
    pub supported_scopes: ScopeSet,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Authorization code lifetime in seconds (bounded at 120)
    pub auth_code_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error when a required variable is missing or malformed
    pub fn from_env() -> AppResult<Self> {
        let token_secret = hex::decode(require_var("TOKEN_SECRET")?).map_err(|_| {
            AppError::config("TOKEN_SECRET must be hex-encoded bytes")
        })?;
        if token_secret.len() < 32 {
            return Err(AppError::config(
                "TOKEN_SECRET must decode to at least 32 bytes",
            ));
        }

        let http_port: u16 = var_or("HTTP_PORT", "8081")
            .parse()
            .map_err(|_| AppError::config("HTTP_PORT must be a valid port number"))?;

        let auth_code_ttl_secs: i64 = var_or("AUTH_CODE_TTL_SECS", "90")
            .parse()
            .map_err(|_| AppError::config("AUTH_CODE_TTL_SECS must be an integer"))?;
        if !(1..=MAX_AUTH_CODE_TTL_SECS).contains(&auth_code_ttl_secs) {
            return Err(AppError::config(format!(
                "AUTH_CODE_TTL_SECS must be between 1 and {MAX_AUTH_CODE_TTL_SECS}"
            )));
        }

        let access_token_ttl_secs: i64 = var_or("ACCESS_TOKEN_TTL_SECS", "3600")
            .parse()
            .map_err(|_| AppError::config("ACCESS_TOKEN_TTL_SECS must be an integer"))?;

        let refresh_token_ttl_days: i64 = var_or("REFRESH_TOKEN_TTL_DAYS", "30")
            .parse()
            .map_err(|_| AppError::config("REFRESH_TOKEN_TTL_DAYS must be an integer"))?;

        Ok(Self {
            host: var_or("HOST", "127.0.0.1"),
            http_port,
            issuer_url: var_or("ISSUER_URL", &format!("http://127.0.0.1:{http_port}")),
            token_secret,
            database_url: var_or("DATABASE_URL", "memory"),
            login_url: require_var("LOGIN_URL")?,
            consent_url: require_var("CONSENT_URL")?,
            supported_scopes: ScopeSet::parse(&var_or("SUPPORTED_SCOPES", DEFAULT_SCOPES)),
            access_token_ttl_secs,
            auth_code_ttl_secs,
            refresh_token_ttl_secs: refresh_token_ttl_days * 24 * 3600,
        })
    }
}

/// Configuration for the embedded OAuth client / token manager
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    /// Base URL of the authorization server (no trailing slash)
    pub auth_base_url: String,
    /// This client's id
    pub client_id: String,
    /// This client's secret; `None` for public clients
    pub client_secret: Option<String>,
    /// Registered redirect URI for the authorization code flow
    pub redirect_uri: String,
    /// Scopes to request
    pub scope: ScopeSet,
    /// Static fallback access token; read only in debug builds
    pub dev_access_token: Option<String>,
}

impl OAuthClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error when a required variable is missing
    pub fn from_env() -> AppResult<Self> {
        // Release builds never honor the static fallback, even if set
        let dev_access_token = if cfg!(debug_assertions) {
            env::var("WALLET_DEV_ACCESS_TOKEN").ok()
        } else {
            None
        };

        Ok(Self {
            auth_base_url: require_var("WALLET_AUTH_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            client_id: require_var("WALLET_CLIENT_ID")?,
            client_secret: env::var("WALLET_CLIENT_SECRET").ok(),
            redirect_uri: require_var("WALLET_REDIRECT_URI")?,
            scope: ScopeSet::parse(&var_or("WALLET_SCOPE", "wallet:accounts:read")),
            dev_access_token,
        })
    }
}

fn require_var(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| {
        AppError::new(
            ErrorCode::ConfigMissing,
            format!("environment variable {name} is required"),
        )
    })
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_var_errors() {
        let err = require_var("WALLET_OAUTH_TEST_DOES_NOT_EXIST").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissing);
    }

    #[test]
    fn test_var_or_falls_back() {
        assert_eq!(var_or("WALLET_OAUTH_TEST_DOES_NOT_EXIST", "x"), "x");
    }
}
