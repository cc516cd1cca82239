// ABOUTME: OAuth 2.1 request/response models for the authorization server
// ABOUTME: Token requests are parsed into a tagged grant enum at the boundary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// OAuth 2.0 Client Registration Request (RFC 7591 subset)
#[derive(Debug, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Scopes the client can request
    pub scope: Option<String>,
    /// How the client authenticates at the token endpoint;
    /// `"none"` registers a public client, anything else (default
    /// `client_secret_basic`) a confidential one
    pub token_endpoint_auth_method: Option<String>,
}

/// OAuth 2.0 Client Registration Response (RFC 7591)
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret; present only for confidential clients, shown only here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// When the client was registered (unix seconds)
    pub client_id_issued_at: i64,
    /// Redirect URIs registered for this client
    pub redirect_uris: Vec<String>,
    /// Scopes this client can request
    pub scope: String,
    /// Effective token endpoint auth method
    pub token_endpoint_auth_method: String,
}

/// OAuth 2.1 Authorization Request (`GET /oauth2/authorize`)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI, exact match against registration
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter for CSRF protection
    pub state: Option<String>,
    /// PKCE code challenge (mandatory)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; only `S256` is accepted
    pub code_challenge_method: Option<String>,
}

/// Consent submission (`POST /oauth2/authorize`), carrying the round-tripped
/// authorization parameters plus the resource owner's decision
#[derive(Debug, Deserialize, Serialize)]
pub struct ConsentSubmission {
    /// The original authorization parameters, unchanged
    #[serde(flatten)]
    pub request: AuthorizeRequest,
    /// Whether the resource owner approved the request
    pub approved: bool,
}

/// Successful authorization response
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    /// Authorization code
    pub code: String,
    /// State parameter echoed from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Fully-formed redirect URL carrying `code` and `state`
    pub redirect_to: String,
}

/// Raw token request body before grant dispatch
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `refresh_token`, `client_credentials`)
    pub grant_type: String,
    /// Client ID; may arrive via HTTP Basic auth instead of the body
    pub client_id: Option<String>,
    /// Client secret (confidential clients)
    pub client_secret: Option<String>,
    /// Authorization code
    pub code: Option<String>,
    /// Redirect URI, must match the one the code was issued for
    pub redirect_uri: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// Requested scopes
    pub scope: Option<String>,
}

/// A token request after boundary validation; each variant carries exactly
/// the fields its grant needs
#[derive(Debug)]
pub enum TokenGrant {
    /// `authorization_code` exchange with mandatory PKCE
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: String,
        client_id: String,
        client_secret: Option<String>,
    },
    /// `refresh_token` rotation
    RefreshToken {
        refresh_token: String,
        client_id: String,
        client_secret: Option<String>,
        scope: Option<String>,
    },
    /// `client_credentials` for machine-to-machine access
    ClientCredentials {
        client_id: String,
        client_secret: String,
        scope: Option<String>,
    },
}

impl TryFrom<TokenRequest> for TokenGrant {
    type Error = OAuthError;

    fn try_from(req: TokenRequest) -> Result<Self, OAuthError> {
        let client_id = req
            .client_id
            .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
        match req.grant_type.as_str() {
            "authorization_code" => Ok(Self::AuthorizationCode {
                code: req
                    .code
                    .ok_or_else(|| OAuthError::invalid_request("code is required"))?,
                redirect_uri: req
                    .redirect_uri
                    .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?,
                code_verifier: req
                    .code_verifier
                    .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?,
                client_id,
                client_secret: req.client_secret,
            }),
            "refresh_token" => Ok(Self::RefreshToken {
                refresh_token: req
                    .refresh_token
                    .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?,
                client_id,
                client_secret: req.client_secret,
                scope: req.scope,
            }),
            "client_credentials" => Ok(Self::ClientCredentials {
                client_id,
                client_secret: req
                    .client_secret
                    .ok_or_else(OAuthError::invalid_client)?,
                scope: req.scope,
            }),
            _ => Err(OAuthError::unsupported_grant_type()),
        }
    }
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (signed compact token)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Scopes granted
    pub scope: String,
    /// Refresh token; absent for `client_credentials`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Revocation request (RFC 7009)
#[derive(Debug, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke
    pub token: String,
    /// Hint: `access_token` or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client ID
    pub client_id: String,
    /// Client secret (confidential clients)
    pub client_secret: Option<String>,
}

/// Introspection request (RFC 7662)
#[derive(Debug, Deserialize)]
pub struct IntrospectionRequest {
    /// The token to introspect
    pub token: String,
    /// Hint: `access_token` or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client ID
    pub client_id: String,
    /// Client secret (confidential clients)
    pub client_secret: Option<String>,
}

/// Introspection response (RFC 7662)
#[derive(Debug, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active
    pub active: bool,
    /// Granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Token type: `access_token` or `refresh_token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl IntrospectionResponse {
    /// The uniform negative answer; deliberately claim-free
    #[must_use]
    pub const fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            token_type: None,
            exp: None,
            iat: None,
        }
    }
}

/// Userinfo response; a minimal stub, not OpenID Connect
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    /// Subject identifier
    pub sub: String,
    /// Client the presented token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scope: String,
}

/// Authorization server metadata (RFC 8414)
#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveryMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthError {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthError {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `access_denied` error (resource owner declined)
    #[must_use]
    pub fn access_denied() -> Self {
        Self {
            error: "access_denied".to_owned(),
            error_description: Some("The resource owner denied the request".to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_token` error (RFC 6750, resource access)
    #[must_use]
    pub fn invalid_token(description: &str) -> Self {
        Self {
            error: "invalid_token".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6750#section-3.1".to_owned(),
            ),
        }
    }

    /// Create an `insufficient_scope` error (RFC 6750, resource access)
    #[must_use]
    pub fn insufficient_scope(description: &str) -> Self {
        Self {
            error: "insufficient_scope".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6750#section-3.1".to_owned(),
            ),
        }
    }

    /// Create a `server_error`
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_owned(),
            error_description: Some("An internal error occurred".to_owned()),
            error_uri: None,
        }
    }

    /// HTTP status appropriate for this error code at the token endpoint
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" => StatusCode::UNAUTHORIZED,
            "insufficient_scope" => StatusCode::FORBIDDEN,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self)).into_response()
    }
}
