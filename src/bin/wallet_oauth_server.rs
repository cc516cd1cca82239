// ABOUTME: Authorization server binary: config, store selection, serve loop
// ABOUTME: Spawns a periodic grant sweep and shuts down cleanly on ctrl-c
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use wallet_oauth::config::ServerConfig;
use wallet_oauth::grants::GrantStore;
use wallet_oauth::logging;
use wallet_oauth::server::{oauth2_routes, AuthorizationServer};
use wallet_oauth::store::{AuthStore, MemoryAuthStore, SqliteAuthStore};

/// How often expired grants are swept from the store
const SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "wallet-oauth-server")]
#[command(about = "Wallet OAuth 2.1 authorization server")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL (`sqlite:...` or `memory`)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    let store: Arc<dyn AuthStore> = if config.database_url == "memory" {
        info!("using in-memory auth store");
        Arc::new(MemoryAuthStore::new())
    } else {
        info!(database_url = %config.database_url, "using SQLite auth store");
        Arc::new(
            SqliteAuthStore::connect(&config.database_url)
                .await
                .context("failed to open the auth store database")?,
        )
    };

    let server = Arc::new(AuthorizationServer::new(store.clone(), &config)?);

    // Passive expiry is authoritative; the sweep is storage hygiene only
    let sweeper = GrantStore::new(
        store,
        config.auth_code_ttl_secs,
        config.refresh_token_ttl_secs,
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match sweeper.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept expired grants"),
                Err(e) => error!(error = %e, "grant sweep failed"),
            }
        }
    });

    let addr = format!("{}:{}", config.host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(issuer = %config.issuer_url, addr = %addr, "authorization server listening");

    axum::serve(listener, oauth2_routes(server))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl-c handler");
    }
}
