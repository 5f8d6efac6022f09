// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SubTrack API Server
//!
//! Finds recurring subscriptions in a user's Gmail inbox and tracks them
//! alongside manually entered ones.

use std::sync::Arc;
use subtrack::{
    config::Config,
    db::{FileBackend, RecordStore},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting SubTrack API");

    // Open the record store
    let backend = FileBackend::open(&config.data_dir)?;
    let store = RecordStore::new(Arc::new(backend));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store));

    // Build router
    let app = subtrack::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("subtrack=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
