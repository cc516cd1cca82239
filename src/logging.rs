// ABOUTME: Logging configuration and structured logging setup
// ABOUTME: Env-filtered tracing subscriber; token material is never logged
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Wallet HQ

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber from `RUST_LOG`.
///
/// Defaults to `info` for this crate and `warn` for dependencies when
/// `RUST_LOG` is unset.
///
/// # Errors
/// Returns an error if a subscriber is already installed
pub fn init_from_env() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,wallet_oauth=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}
