// ABOUTME: Dynamic client registration and authentication (RFC 7591 subset)
// ABOUTME: Secrets are Argon2id hashed at rest; plaintext is shown exactly once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use crate::errors::{AppError, AppResult};
use crate::scopes::ScopeSet;
use crate::store::{AuthStore, OAuthClientRecord};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Length in bytes of generated client secrets before encoding
const CLIENT_SECRET_BYTES: usize = 32;

/// A registration request after boundary deserialization
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    /// Redirect URIs, exact-match at authorization time
    pub redirect_uris: Vec<String>,
    /// Requested scopes; defaults to the server's supported set when empty
    pub scope: Option<String>,
    /// Whether the client can hold a secret
    pub confidential: bool,
}

/// Registration outcome, including the one-time plaintext secret
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// The persisted record
    pub record: OAuthClientRecord,
    /// Plaintext secret; only ever returned here, `None` for public clients
    pub client_secret: Option<String>,
}

/// Manages client registration, lookup, and credential checks
pub struct ClientRegistry {
    store: Arc<dyn AuthStore>,
    supported_scopes: ScopeSet,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, supported_scopes: ScopeSet) -> Self {
        Self {
            store,
            supported_scopes,
        }
    }

    /// Register a new OAuth client.
    ///
    /// Redirect URIs must be absolute, carry no fragment, and use https unless
    /// they point at localhost. Requested scopes are intersected with the
    /// server's supported set; requesting nothing grants everything supported.
    ///
    /// # Errors
    /// Returns an error if any redirect URI is invalid or storage fails
    pub async fn register(&self, request: ClientRegistration) -> AppResult<RegisteredClient> {
        if request.redirect_uris.is_empty() {
            return Err(AppError::invalid_input(
                "at least one redirect_uri is required",
            ));
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri(uri)?;
        }

        let allowed = match request.scope.as_deref() {
            Some(s) if !s.trim().is_empty() => {
                let requested = ScopeSet::parse(s);
                let granted = requested.intersection(&self.supported_scopes);
                if granted.is_empty() {
                    return Err(AppError::invalid_input(
                        "none of the requested scopes are supported",
                    ));
                }
                granted
            }
            _ => self.supported_scopes.clone(),
        };

        let client_id = format!("wallet_client_{}", Uuid::new_v4().simple());

        let (client_secret, client_secret_hash) = if request.confidential {
            let secret = generate_secret()?;
            let hash = hash_secret(&secret)?;
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let record = OAuthClientRecord {
            client_id: client_id.clone(),
            client_secret_hash,
            redirect_uris: request.redirect_uris,
            allowed_scopes: allowed.to_scope_string(),
            confidential: request.confidential,
            created_at: Utc::now(),
        };

        self.store.store_client(&record).await?;
        tracing::info!(
            client_id = %client_id,
            confidential = record.confidential,
            "registered OAuth client"
        );

        Ok(RegisteredClient {
            record,
            client_secret,
        })
    }

    /// Look up a client by id
    ///
    /// # Errors
    /// Returns an error if storage fails
    pub async fn get(&self, client_id: &str) -> AppResult<Option<OAuthClientRecord>> {
        self.store.get_client(client_id).await
    }

    /// Authenticate a client by id and secret.
    ///
    /// Public clients authenticate by id alone and must present no secret.
    /// Confidential clients must present the secret matching their stored hash.
    ///
    /// # Errors
    /// Returns `AuthInvalid` when credentials do not match a registered client
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> AppResult<OAuthClientRecord> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::auth_invalid("unknown client"))?;

        match (&client.client_secret_hash, client_secret) {
            (Some(hash), Some(secret)) => {
                if verify_secret(secret, hash) {
                    Ok(client)
                } else {
                    Err(AppError::auth_invalid("invalid client credentials"))
                }
            }
            (Some(_), None) => Err(AppError::auth_invalid(
                "client authentication required for confidential client",
            )),
            (None, None) => Ok(client),
            (None, Some(_)) => Err(AppError::auth_invalid(
                "public client must not present a secret",
            )),
        }
    }

    /// Rotate a confidential client's secret, returning the new plaintext
    ///
    /// # Errors
    /// Returns an error for unknown or public clients
    pub async fn rotate_secret(&self, client_id: &str) -> AppResult<String> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("OAuth client"))?;
        if !client.confidential {
            return Err(AppError::invalid_input(
                "public clients have no secret to rotate",
            ));
        }

        let secret = generate_secret()?;
        let hash = hash_secret(&secret)?;
        self.store.update_client_secret(client_id, &hash).await?;
        tracing::info!(client_id = %client_id, "rotated client secret");
        Ok(secret)
    }
}

/// Validate a redirect URI: absolute, no fragment, no wildcard host, https
/// except for localhost development
///
/// # Errors
/// Returns `InvalidInput` describing the first violated rule
pub fn validate_redirect_uri(uri: &str) -> AppResult<()> {
    let parsed = Url::parse(uri)
        .map_err(|_| AppError::invalid_input(format!("redirect_uri is not a valid URL: {uri}")))?;

    if parsed.fragment().is_some() {
        return Err(AppError::invalid_input(
            "redirect_uri must not contain a fragment",
        ));
    }

    let host = parsed.host_str().unwrap_or_default();
    if host.contains('*') {
        return Err(AppError::invalid_input(
            "redirect_uri must not contain wildcards",
        ));
    }

    let is_localhost = host == "localhost" || host == "127.0.0.1" || host == "[::1]";
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_localhost => Ok(()),
        scheme => Err(AppError::invalid_input(format!(
            "redirect_uri scheme '{scheme}' is not allowed (https required except localhost)"
        ))),
    }
}

fn generate_secret() -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; CLIENT_SECRET_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::internal("failed to generate random bytes"))?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}

fn hash_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("failed to hash client secret: {e}")))
}

fn verify_secret(secret: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_rules() {
        assert!(validate_redirect_uri("https://app.example.com/callback").is_ok());
        assert!(validate_redirect_uri("http://localhost:3000/callback").is_ok());
        assert!(validate_redirect_uri("http://127.0.0.1:8080/cb").is_ok());

        assert!(validate_redirect_uri("http://app.example.com/callback").is_err());
        assert!(validate_redirect_uri("https://app.example.com/cb#frag").is_err());
        assert!(validate_redirect_uri("https://*.example.com/cb").is_err());
        assert!(validate_redirect_uri("not a url").is_err());
    }

    #[test]
    fn test_secret_hash_roundtrip() {
        let secret = generate_secret().unwrap();
        let hash = hash_secret(&secret).unwrap();
        assert!(verify_secret(&secret, &hash));
        assert!(!verify_secret("wrong-secret", &hash));
    }
}
