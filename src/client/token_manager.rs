// ABOUTME: Cached, self-renewing access token supply for the wallet client
// ABOUTME: Single-flight renewal with refresh rotation and grant fallback
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::client::flow::AuthorizationAttempt;
use crate::client::AuthServerClient;
use crate::config::OAuthClientConfig;
use crate::server::models::TokenResponse;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Renewal starts this long before the token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl CachedToken {
    fn from_response(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
            refresh_token: response.refresh_token,
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Default)]
struct ManagerState {
    token: Option<CachedToken>,
    pending: Option<AuthorizationAttempt>,
}

/// Keeps a valid access token on hand for resource API calls.
///
/// The state sits behind one async mutex held across the renewal network
/// call, so concurrent callers during a renewal all await the same outcome
/// instead of stampeding the token endpoint.
pub struct TokenManager {
    client: AuthServerClient,
    state: Mutex<ManagerState>,
}

impl TokenManager {
    /// Build a manager for the configured client
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        Ok(Self {
            client: AuthServerClient::new(config)?,
            state: Mutex::new(ManagerState::default()),
        })
    }

    /// Return a valid access token, renewing when within the expiry margin.
    ///
    /// Renewal prefers refresh-token rotation; a dead refresh token
    /// (`invalid_grant`) falls back to a client-credentials acquisition.
    ///
    /// # Errors
    /// Returns an error when no grant path can produce a token
    pub async fn get_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if let Some(token) = &state.token {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        // Lock stays held through the renewal: single-flight
        let refresh_token = state
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            match self.client.refresh(&refresh_token).await {
                Ok(response) => {
                    let token = CachedToken::from_response(response);
                    let access = token.access_token.clone();
                    state.token = Some(token);
                    return Ok(access);
                }
                Err(e) if e.is_invalid_grant() => {
                    tracing::warn!(error = %e, "refresh token rejected, falling back");
                    state.token = None;
                }
                Err(e) => return Err(anyhow!(e).context("token refresh failed")),
            }
        }

        if self.client.config().client_secret.is_some() {
            match self.client.client_credentials().await {
                Ok(response) => {
                    let token = CachedToken::from_response(response);
                    let access = token.access_token.clone();
                    state.token = Some(token);
                    return Ok(access);
                }
                Err(e) => {
                    #[cfg(debug_assertions)]
                    if let Some(dev) = &self.client.config().dev_access_token {
                        tracing::warn!("using configured static development token");
                        return Ok(dev.clone());
                    }
                    return Err(anyhow!(e).context("client_credentials acquisition failed"));
                }
            }
        }

        #[cfg(debug_assertions)]
        if let Some(dev) = &self.client.config().dev_access_token {
            tracing::warn!("using configured static development token");
            return Ok(dev.clone());
        }

        bail!("no valid token and no credentials to acquire one; run the authorization flow")
    }

    /// Start an authorization code flow; returns the URL to open in a browser.
    /// Any previous unfinished attempt is discarded.
    pub async fn begin_authorization(&self) -> String {
        let attempt = AuthorizationAttempt::begin(self.client.config());
        let url = attempt.authorize_url.clone();
        self.state.lock().await.pending = Some(attempt);
        url
    }

    /// Complete the authorization code flow from the callback parameters.
    ///
    /// The pending attempt is consumed whether or not the exchange succeeds;
    /// a state mismatch rejects the callback outright.
    ///
    /// # Errors
    /// Returns an error when no attempt is pending, the state does not match,
    /// or the code exchange fails
    pub async fn complete_authorization(&self, code: &str, callback_state: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        let attempt = state
            .pending
            .take()
            .context("no authorization attempt in progress")?;
        if !attempt.state_matches(callback_state) {
            bail!("authorization callback state does not match the pending attempt");
        }

        let response = self
            .client
            .exchange_code(code, &attempt.code_verifier)
            .await
            .map_err(|e| anyhow!(e).context("authorization code exchange failed"))?;

        state.token = Some(CachedToken::from_response(response));
        tracing::info!("authorization flow completed, tokens cached");
        Ok(())
    }

    /// Drop the cached token, forcing renewal on the next call
    pub async fn invalidate(&self) {
        self.state.lock().await.token = None;
    }
}
