// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GigCalc API Server
//!
//! Google sign-in, server-side sessions and per-account storage of
//! gig earnings calculations.

use gigcalc_api::{
    config::Config, db::Database, services::GoogleIdTokenVerifier, services::SessionManager,
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        backend = ?config.storage_backend,
        session_ttl_secs = config.session_policy.ttl.as_secs(),
        renewal = ?config.session_policy.renewal,
        "Starting GigCalc API"
    );

    let db = Database::connect(&config)
        .await
        .expect("Failed to connect to data store");

    let id_verifier = Arc::new(
        GoogleIdTokenVerifier::new(&config).expect("Failed to initialize ID token verifier"),
    );

    // Build shared state
    let state = Arc::new(
        AppState::new(config.clone(), db, id_verifier).expect("Failed to build application state"),
    );

    spawn_session_sweeper(state.sessions.clone(), config.session_sweep_interval);

    // Build router
    let app = gigcalc_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically purge expired sessions. Validation expires sessions lazily,
/// so this only reclaims storage.
fn spawn_session_sweeper(sessions: SessionManager, every: Duration) {
    if every.is_zero() {
        tracing::info!("Session sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sessions.sweep().await {
                tracing::warn!(error = %e, "Session sweep failed; retrying next tick");
            }
        }
    });
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gigcalc_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
