// ABOUTME: OAuth 2.1 authorization server: models, endpoint logic, and routes
// ABOUTME: Authorization code + PKCE, refresh rotation, and client credentials
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

pub mod endpoints;
pub mod models;
pub mod routes;

pub use endpoints::{AuthorizationServer, AuthorizeOutcome};
pub use routes::oauth2_routes;
