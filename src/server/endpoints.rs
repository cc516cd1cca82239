// ABOUTME: Authorization server endpoint logic, decoupled from HTTP extraction
// ABOUTME: Authorize, token, register, revoke, introspect, userinfo, discovery
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::config::ServerConfig;
use crate::errors::AppResult;
use crate::grants::{CodeParams, GrantStore};
use crate::pkce;
use crate::registry::{ClientRegistration, ClientRegistry};
use crate::scopes::ScopeSet;
use crate::server::models::{
    AuthorizeRequest, AuthorizeResponse, ClientRegistrationRequest, ClientRegistrationResponse,
    ConsentSubmission, DiscoveryMetadata, IntrospectionRequest, IntrospectionResponse, OAuthError,
    RevocationRequest, TokenGrant, TokenResponse, UserInfoResponse,
};
use crate::store::{AuthStore, GrantError, OAuthClientRecord};
use crate::token_codec::{AccessTokenParams, TokenCodec, VerificationError};
use std::sync::Arc;
use url::Url;

/// How an authorization request resolves.
///
/// Errors split in two: once the client and redirect URI are validated, errors
/// ride the redirect; before that they are answered directly so an attacker
/// can never turn the endpoint into an open redirector.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Resource owner is not authenticated; 302 to the login page
    RedirectToLogin(String),
    /// Consent is needed; 302 to the consent page with parameters preserved
    RedirectToConsent(String),
    /// A code was issued (valid session plus covering cached consent)
    Issued(AuthorizeResponse),
    /// Protocol error delivered on the validated redirect URI
    RedirectWithError(String),
    /// Direct JSON error; client or redirect URI did not validate
    Error(OAuthError),
}

/// The authorization server core shared across HTTP handlers
pub struct AuthorizationServer {
    registry: ClientRegistry,
    grants: GrantStore,
    codec: TokenCodec,
    issuer_url: String,
    login_url: String,
    consent_url: String,
    supported_scopes: ScopeSet,
}

impl AuthorizationServer {
    /// Build the server over a store and its configuration
    ///
    /// # Errors
    /// Returns an error when the token secret is unusable
    pub fn new(store: Arc<dyn AuthStore>, config: &ServerConfig) -> AppResult<Self> {
        Ok(Self {
            registry: ClientRegistry::new(store.clone(), config.supported_scopes.clone()),
            grants: GrantStore::new(
                store,
                config.auth_code_ttl_secs,
                config.refresh_token_ttl_secs,
            ),
            codec: TokenCodec::new(&config.token_secret, config.access_token_ttl_secs)?,
            issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
            login_url: config.login_url.clone(),
            consent_url: config.consent_url.clone(),
            supported_scopes: config.supported_scopes.clone(),
        })
    }

    /// The token codec, shared with the resource middleware
    #[must_use]
    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// The grant store, shared with the resource middleware
    #[must_use]
    pub const fn grants(&self) -> &GrantStore {
        &self.grants
    }

    /// The client registry
    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    // -- authorize ---------------------------------------------------------

    /// Handle `GET /oauth2/authorize`
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        session_token: Option<&str>,
    ) -> AuthorizeOutcome {
        let (client, scope) = match self.validate_authorize_request(&request).await {
            Ok(validated) => validated,
            Err(outcome) => return *outcome,
        };

        let Some(subject_id) = self.session_subject(session_token) else {
            return AuthorizeOutcome::RedirectToLogin(self.login_redirect(&request));
        };

        match self
            .grants
            .has_consent(&subject_id, &client.client_id, &scope)
            .await
        {
            Ok(true) => {
                self.issue_code(&request, &client, &scope, &subject_id)
                    .await
            }
            Ok(false) => {
                AuthorizeOutcome::RedirectToConsent(self.consent_redirect(&request, &subject_id))
            }
            Err(e) => {
                tracing::error!(error = %e, "consent lookup failed");
                AuthorizeOutcome::Error(OAuthError::server_error())
            }
        }
    }

    /// Handle `POST /oauth2/authorize` (consent submission)
    pub async fn submit_consent(
        &self,
        submission: ConsentSubmission,
        session_token: Option<&str>,
    ) -> AuthorizeOutcome {
        let request = submission.request;
        let (client, scope) = match self.validate_authorize_request(&request).await {
            Ok(validated) => validated,
            Err(outcome) => return *outcome,
        };

        let Some(subject_id) = self.session_subject(session_token) else {
            return AuthorizeOutcome::RedirectToLogin(self.login_redirect(&request));
        };

        if !submission.approved {
            tracing::info!(client_id = %client.client_id, "resource owner denied authorization");
            return AuthorizeOutcome::RedirectWithError(redirect_with_error(
                &request.redirect_uri,
                &OAuthError::access_denied(),
                request.state.as_deref(),
            ));
        }

        if let Err(e) = self
            .grants
            .record_consent(&subject_id, &client.client_id, &scope)
            .await
        {
            tracing::error!(error = %e, "failed to record consent");
            return AuthorizeOutcome::Error(OAuthError::server_error());
        }

        self.issue_code(&request, &client, &scope, &subject_id)
            .await
    }

    /// Validate client, redirect URI, response type, scope, and PKCE.
    /// Failures are already shaped into the right delivery channel.
    async fn validate_authorize_request(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<(OAuthClientRecord, ScopeSet), Box<AuthorizeOutcome>> {
        let client = match self.registry.get(&request.client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                return Err(Box::new(AuthorizeOutcome::Error(
                    OAuthError::invalid_request("unknown client_id"),
                )))
            }
            Err(e) => {
                tracing::error!(error = %e, "client lookup failed");
                return Err(Box::new(AuthorizeOutcome::Error(OAuthError::server_error())));
            }
        };

        // Exact string match; no prefix or wildcard matching
        if !client
            .redirect_uris
            .iter()
            .any(|uri| uri == &request.redirect_uri)
        {
            return Err(Box::new(AuthorizeOutcome::Error(
                OAuthError::invalid_request("redirect_uri is not registered for this client"),
            )));
        }

        // From here on, errors are delivered on the redirect URI
        let state = request.state.as_deref();

        if request.response_type != "code" {
            return Err(self.redirect_error(
                request,
                &OAuthError::invalid_request("only response_type=code is supported"),
                state,
            ));
        }

        let Some(code_challenge) = request.code_challenge.as_deref() else {
            return Err(self.redirect_error(
                request,
                &OAuthError::invalid_request("code_challenge is required (PKCE)"),
                state,
            ));
        };
        let method = request.code_challenge_method.as_deref().unwrap_or("S256");
        if method != pkce::METHOD_S256 {
            return Err(self.redirect_error(
                request,
                &OAuthError::invalid_request("only the S256 code_challenge_method is supported"),
                state,
            ));
        }
        if code_challenge.is_empty() {
            return Err(self.redirect_error(
                request,
                &OAuthError::invalid_request("code_challenge must not be empty"),
                state,
            ));
        }

        let allowed = ScopeSet::parse(&client.allowed_scopes);
        let scope = match request.scope.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let requested = ScopeSet::parse(raw);
                if !requested.is_subset(&allowed) {
                    return Err(self.redirect_error(
                        request,
                        &OAuthError::invalid_scope("requested scope exceeds the client's grant"),
                        state,
                    ));
                }
                requested
            }
            _ => allowed,
        };

        Ok((client, scope))
    }

    fn redirect_error(
        &self,
        request: &AuthorizeRequest,
        error: &OAuthError,
        state: Option<&str>,
    ) -> Box<AuthorizeOutcome> {
        Box::new(AuthorizeOutcome::RedirectWithError(redirect_with_error(
            &request.redirect_uri,
            error,
            state,
        )))
    }

    async fn issue_code(
        &self,
        request: &AuthorizeRequest,
        client: &OAuthClientRecord,
        scope: &ScopeSet,
        subject_id: &str,
    ) -> AuthorizeOutcome {
        // validate_authorize_request guarantees the challenge is present
        let code_challenge = request.code_challenge.as_deref().unwrap_or_default();

        let record = match self
            .grants
            .create_code(CodeParams {
                client_id: &client.client_id,
                redirect_uri: &request.redirect_uri,
                scope,
                state: request.state.as_deref(),
                code_challenge,
                code_challenge_method: pkce::METHOD_S256,
                subject_id,
            })
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, "failed to issue authorization code");
                return AuthorizeOutcome::Error(OAuthError::server_error());
            }
        };

        let mut redirect_to = match Url::parse(&request.redirect_uri) {
            Ok(url) => url,
            Err(_) => return AuthorizeOutcome::Error(OAuthError::server_error()),
        };
        {
            let mut pairs = redirect_to.query_pairs_mut();
            pairs.append_pair("code", &record.code);
            if let Some(state) = &request.state {
                pairs.append_pair("state", state);
            }
        }

        AuthorizeOutcome::Issued(AuthorizeResponse {
            code: record.code,
            state: request.state.clone(),
            redirect_to: redirect_to.into(),
        })
    }

    fn session_subject(&self, session_token: Option<&str>) -> Option<String> {
        let token = session_token?;
        match self.codec.verify_session_token(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                None
            }
        }
    }

    fn login_redirect(&self, request: &AuthorizeRequest) -> String {
        let return_to = self.authorize_url(request);
        format!(
            "{}?return_to={}",
            self.login_url,
            urlencoding::encode(&return_to)
        )
    }

    fn consent_redirect(&self, request: &AuthorizeRequest, subject_id: &str) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&subject={}",
            self.consent_url,
            urlencoding::encode(&request.client_id),
            urlencoding::encode(&request.redirect_uri),
            urlencoding::encode(subject_id),
        );
        if let Some(scope) = &request.scope {
            url.push_str(&format!("&scope={}", urlencoding::encode(scope)));
        }
        if let Some(state) = &request.state {
            url.push_str(&format!("&state={}", urlencoding::encode(state)));
        }
        if let Some(challenge) = &request.code_challenge {
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencoding::encode(challenge)
            ));
        }
        url
    }

    fn authorize_url(&self, request: &AuthorizeRequest) -> String {
        let mut url = format!(
            "{}/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}",
            self.issuer_url,
            urlencoding::encode(&request.client_id),
            urlencoding::encode(&request.redirect_uri),
        );
        if let Some(scope) = &request.scope {
            url.push_str(&format!("&scope={}", urlencoding::encode(scope)));
        }
        if let Some(state) = &request.state {
            url.push_str(&format!("&state={}", urlencoding::encode(state)));
        }
        if let Some(challenge) = &request.code_challenge {
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencoding::encode(challenge)
            ));
        }
        url
    }

    // -- token -------------------------------------------------------------

    /// Handle `POST /oauth2/token`
    ///
    /// # Errors
    /// Returns a protocol error for the JSON error body
    pub async fn token(&self, grant: TokenGrant) -> Result<TokenResponse, OAuthError> {
        match grant {
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
                client_id,
                client_secret,
            } => {
                self.exchange_code(&code, &redirect_uri, &code_verifier, &client_id, client_secret.as_deref())
                    .await
            }
            TokenGrant::RefreshToken {
                refresh_token,
                client_id,
                client_secret,
                scope,
            } => {
                self.refresh(&refresh_token, &client_id, client_secret.as_deref(), scope.as_deref())
                    .await
            }
            TokenGrant::ClientCredentials {
                client_id,
                client_secret,
                scope,
            } => {
                self.client_credentials(&client_id, &client_secret, scope.as_deref())
                    .await
            }
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(client_id, client_secret).await?;

        // Atomic consume first; everything after never un-consumes
        let record = self.grants.consume_code(code).await.map_err(grant_error)?;

        if record.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "code presented by a different client");
            return Err(OAuthError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
        if !pkce::verify_challenge(
            code_verifier,
            &record.code_challenge,
            &record.code_challenge_method,
        ) {
            tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
            return Err(OAuthError::invalid_grant("PKCE verification failed"));
        }

        let scope = ScopeSet::parse(&record.scope);
        let issued = self
            .codec
            .issue_access_token(AccessTokenParams {
                subject_id: Some(&record.subject_id),
                client_id: &client.client_id,
                scope: &scope,
            })
            .map_err(server_error)?;
        let refresh = self
            .grants
            .issue_refresh_token(&client.client_id, Some(&record.subject_id), &scope)
            .await
            .map_err(server_error)?;

        tracing::info!(client_id = %client.client_id, "authorization code exchanged");
        Ok(TokenResponse {
            access_token: issued.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            scope: scope.to_scope_string(),
            refresh_token: Some(refresh.token),
        })
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
        requested_scope: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(client_id, client_secret).await?;

        // Ownership check before rotation so another client's token is
        // rejected without being disturbed
        let current = self
            .grants
            .get_refresh_token(refresh_token)
            .await
            .map_err(server_error)?
            .ok_or_else(|| OAuthError::invalid_grant("refresh token is invalid"))?;
        if current.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }

        let granted = ScopeSet::parse(&current.scope);
        let scope = match requested_scope {
            Some(raw) if !raw.trim().is_empty() => {
                let requested = ScopeSet::parse(raw);
                if !requested.is_subset(&granted) {
                    return Err(OAuthError::invalid_scope(
                        "requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            _ => granted,
        };

        let (old, successor) = self
            .grants
            .rotate_refresh_token(refresh_token)
            .await
            .map_err(grant_error)?;

        let issued = self
            .codec
            .issue_access_token(AccessTokenParams {
                subject_id: old.subject_id.as_deref(),
                client_id: &client.client_id,
                scope: &scope,
            })
            .map_err(server_error)?;

        tracing::info!(client_id = %client.client_id, "refresh token rotated");
        Ok(TokenResponse {
            access_token: issued.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            scope: scope.to_scope_string(),
            refresh_token: Some(successor.token),
        })
    }

    async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        requested_scope: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self
            .authenticate_client(client_id, Some(client_secret))
            .await?;
        if !client.confidential {
            return Err(OAuthError::unauthorized_client(
                "client_credentials requires a confidential client",
            ));
        }

        let allowed = ScopeSet::parse(&client.allowed_scopes);
        let scope = match requested_scope {
            Some(raw) if !raw.trim().is_empty() => {
                let granted = ScopeSet::parse(raw).intersection(&allowed);
                if granted.is_empty() {
                    return Err(OAuthError::invalid_scope(
                        "none of the requested scopes are granted to this client",
                    ));
                }
                granted
            }
            _ => allowed,
        };

        let issued = self
            .codec
            .issue_access_token(AccessTokenParams {
                subject_id: None,
                client_id: &client.client_id,
                scope: &scope,
            })
            .map_err(server_error)?;

        tracing::info!(client_id = %client.client_id, "client_credentials token issued");
        // No refresh token for machine-to-machine grants
        Ok(TokenResponse {
            access_token: issued.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.codec.access_ttl_secs(),
            scope: scope.to_scope_string(),
            refresh_token: None,
        })
    }

    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<OAuthClientRecord, OAuthError> {
        self.registry
            .authenticate(client_id, client_secret)
            .await
            .map_err(|e| {
                tracing::warn!(client_id = %client_id, error = %e, "client authentication failed");
                OAuthError::invalid_client()
            })
    }

    // -- registration ------------------------------------------------------

    /// Handle `POST /oauth2/register`
    ///
    /// # Errors
    /// Returns `invalid_request` for malformed registrations
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuthError> {
        let auth_method = request
            .token_endpoint_auth_method
            .unwrap_or_else(|| "client_secret_basic".to_owned());
        let confidential = auth_method != "none";

        let registered = self
            .registry
            .register(ClientRegistration {
                redirect_uris: request.redirect_uris,
                scope: request.scope,
                confidential,
            })
            .await
            .map_err(|e| OAuthError::invalid_request(&e.message))?;

        Ok(ClientRegistrationResponse {
            client_id: registered.record.client_id,
            client_secret: registered.client_secret,
            client_id_issued_at: registered.record.created_at.timestamp(),
            redirect_uris: registered.record.redirect_uris,
            scope: registered.record.allowed_scopes,
            token_endpoint_auth_method: auth_method,
        })
    }

    // -- revocation & introspection ---------------------------------------

    /// Handle `POST /oauth2/revoke` (RFC 7009).
    ///
    /// Unknown tokens and tokens owned by other clients are silently ignored;
    /// only failed client authentication is an error.
    ///
    /// # Errors
    /// Returns `invalid_client` when client authentication fails
    pub async fn revoke(&self, request: RevocationRequest) -> Result<(), OAuthError> {
        let client = self
            .authenticate_client(&request.client_id, request.client_secret.as_deref())
            .await?;

        // The hint only orders the search; a wrong hint must not leave a
        // matching token live (RFC 7009 Section 2.1)
        if request.token_type_hint.as_deref() == Some("access_token") {
            if self.revoke_as_access_token(&request.token, &client).await? {
                return Ok(());
            }
            self.revoke_as_refresh_token(&request.token, &client)
                .await?;
        } else {
            if self
                .revoke_as_refresh_token(&request.token, &client)
                .await?
            {
                return Ok(());
            }
            self.revoke_as_access_token(&request.token, &client).await?;
        }

        Ok(())
    }

    async fn revoke_as_refresh_token(
        &self,
        token: &str,
        client: &OAuthClientRecord,
    ) -> Result<bool, OAuthError> {
        let revoked = self
            .grants
            .revoke_refresh_token(token, &client.client_id)
            .await
            .map_err(server_error)?;
        if revoked {
            tracing::info!(client_id = %client.client_id, "refresh token revoked");
        }
        Ok(revoked)
    }

    async fn revoke_as_access_token(
        &self,
        token: &str,
        client: &OAuthClientRecord,
    ) -> Result<bool, OAuthError> {
        let Ok(claims) = self.codec.verify_access_token(token) else {
            return Ok(false);
        };
        if claims.client_id != client.client_id {
            return Ok(false);
        }
        let expires_at =
            chrono::DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(chrono::Utc::now);
        self.grants
            .revoke_access_token(&claims.jti, &client.client_id, expires_at)
            .await
            .map_err(server_error)?;
        tracing::info!(client_id = %client.client_id, "access token revoked");
        Ok(true)
    }

    /// Handle `POST /oauth2/introspect` (RFC 7662).
    ///
    /// A token belonging to a different client than the caller is reported as
    /// inactive, indistinguishable from a nonexistent token.
    ///
    /// # Errors
    /// Returns `invalid_client` when client authentication fails
    pub async fn introspect(
        &self,
        request: IntrospectionRequest,
    ) -> Result<IntrospectionResponse, OAuthError> {
        let client = self
            .authenticate_client(&request.client_id, request.client_secret.as_deref())
            .await?;

        if let Ok(claims) = self.codec.verify_access_token(&request.token) {
            if claims.client_id != client.client_id {
                return Ok(IntrospectionResponse::inactive());
            }
            let revoked = self
                .grants
                .is_access_token_revoked(&claims.jti)
                .await
                .map_err(server_error)?;
            if revoked {
                return Ok(IntrospectionResponse::inactive());
            }
            return Ok(IntrospectionResponse {
                active: true,
                scope: Some(claims.scope),
                client_id: Some(claims.client_id),
                sub: claims.sub,
                token_type: Some("access_token".to_owned()),
                exp: Some(claims.exp),
                iat: Some(claims.iat),
            });
        }

        let record = self
            .grants
            .get_refresh_token(&request.token)
            .await
            .map_err(server_error)?;
        if let Some(record) = record {
            let live = record.client_id == client.client_id
                && !record.revoked
                && !record.rotated
                && record.expires_at > chrono::Utc::now();
            if live {
                return Ok(IntrospectionResponse {
                    active: true,
                    scope: Some(record.scope),
                    client_id: Some(record.client_id),
                    sub: record.subject_id,
                    token_type: Some("refresh_token".to_owned()),
                    exp: Some(record.expires_at.timestamp()),
                    iat: Some(record.issued_at.timestamp()),
                });
            }
        }

        Ok(IntrospectionResponse::inactive())
    }

    // -- userinfo & discovery ---------------------------------------------

    /// Handle `GET /oauth2/userinfo`: a minimal stub over a valid bearer token
    ///
    /// # Errors
    /// Returns `invalid_token` for missing, invalid, or revoked tokens
    pub async fn userinfo(&self, bearer: &str) -> Result<UserInfoResponse, OAuthError> {
        let claims = self.codec.verify_access_token(bearer).map_err(|e| {
            let description = match e {
                VerificationError::Expired => "access token has expired",
                _ => "access token is invalid",
            };
            OAuthError::invalid_token(description)
        })?;
        if self
            .grants
            .is_access_token_revoked(&claims.jti)
            .await
            .map_err(server_error)?
        {
            return Err(OAuthError::invalid_token("access token has been revoked"));
        }

        Ok(UserInfoResponse {
            sub: claims.sub.unwrap_or_else(|| claims.client_id.clone()),
            client_id: claims.client_id,
            scope: claims.scope,
        })
    }

    /// Handle `GET /.well-known/oauth-authorization-server` (RFC 8414)
    #[must_use]
    pub fn discovery(&self) -> DiscoveryMetadata {
        let base = &self.issuer_url;
        DiscoveryMetadata {
            issuer: base.clone(),
            authorization_endpoint: format!("{base}/oauth2/authorize"),
            token_endpoint: format!("{base}/oauth2/token"),
            registration_endpoint: format!("{base}/oauth2/register"),
            revocation_endpoint: format!("{base}/oauth2/revoke"),
            introspection_endpoint: format!("{base}/oauth2/introspect"),
            userinfo_endpoint: format!("{base}/oauth2/userinfo"),
            jwks_uri: format!("{base}/oauth2/jwks"),
            response_types_supported: vec!["code".to_owned()],
            grant_types_supported: vec![
                "authorization_code".to_owned(),
                "refresh_token".to_owned(),
                "client_credentials".to_owned(),
            ],
            code_challenge_methods_supported: vec![pkce::METHOD_S256.to_owned()],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_owned(),
                "client_secret_post".to_owned(),
                "none".to_owned(),
            ],
            scopes_supported: self
                .supported_scopes
                .iter()
                .map(std::borrow::ToOwned::to_owned)
                .collect(),
        }
    }
}

/// Append an OAuth error and optional state to a redirect URI
fn redirect_with_error(redirect_uri: &str, error: &OAuthError, state: Option<&str>) -> String {
    let mut url = format!(
        "{}{}error={}",
        redirect_uri,
        if redirect_uri.contains('?') { "&" } else { "?" },
        urlencoding::encode(&error.error),
    );
    if let Some(description) = &error.error_description {
        url.push_str(&format!(
            "&error_description={}",
            urlencoding::encode(description)
        ));
    }
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    url
}

/// Collapse grant failures into `invalid_grant`, keeping detail in the logs
fn grant_error(error: GrantError) -> OAuthError {
    match error {
        GrantError::Storage(e) => {
            tracing::error!(error = %e, "grant storage failure");
            OAuthError::server_error()
        }
        GrantError::NotFound => OAuthError::invalid_grant("grant is invalid"),
        GrantError::Expired => OAuthError::invalid_grant("grant has expired"),
        GrantError::AlreadyConsumed => {
            OAuthError::invalid_grant("authorization code has already been redeemed")
        }
        GrantError::Revoked => OAuthError::invalid_grant("refresh token has been revoked"),
        GrantError::AlreadyRotated => {
            OAuthError::invalid_grant("refresh token has already been rotated")
        }
    }
}

fn server_error(error: crate::errors::AppError) -> OAuthError {
    tracing::error!(error = %error, "internal failure while serving a token request");
    OAuthError::server_error()
}
