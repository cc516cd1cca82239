// ABOUTME: Main library entry point for the wallet OAuth authorization layer
// ABOUTME: Authorization server, scope middleware, and client token manager
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

#![deny(unsafe_code)]

//! # Wallet OAuth
//!
//! An OAuth 2.1 authorization layer for a personal-finance platform whose
//! protected resource API is consumed by a third-party AI client.
//!
//! ## Features
//!
//! - **Authorization code + PKCE**: S256 only, mandatory for every code flow
//! - **Refresh token rotation**: single-use tokens with atomic rotation
//! - **Client credentials**: machine-to-machine tokens for confidential clients
//! - **Dynamic registration**: RFC 7591 subset with Argon2id secret hashing
//! - **Scope enforcement**: axum middleware gating resource routes on scopes
//! - **Token manager**: cached, single-flight-renewing client-side tokens
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallet_oauth::config::ServerConfig;
//! use wallet_oauth::errors::AppResult;
//! use wallet_oauth::server::{oauth2_routes, AuthorizationServer};
//! use wallet_oauth::store::MemoryAuthStore;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     let store = Arc::new(MemoryAuthStore::new());
//!     let server = Arc::new(AuthorizationServer::new(store, &config)?);
//!     let router = oauth2_routes(server);
//!     println!("router ready on port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// OAuth client side: HTTP calls, flow bookkeeping, and the token manager
pub mod client;

/// Environment-driven configuration
pub mod config;

/// Unified application error handling
pub mod errors;

/// Grant lifecycle management over the auth store
pub mod grants;

/// Logging configuration and setup
pub mod logging;

/// Scope enforcement middleware for the resource API
pub mod middleware;

/// PKCE challenge generation and verification (RFC 7636, S256 only)
pub mod pkce;

/// Dynamic client registration and authentication
pub mod registry;

/// Scope set parsing and comparison
pub mod scopes;

/// Authorization server endpoints and routes
pub mod server;

/// Persistence backends for clients, grants, and consents
pub mod store;

/// Signed access and session token issuance and verification
pub mod token_codec;
