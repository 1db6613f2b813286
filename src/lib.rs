// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GigCalc API: accounts, sessions and saved calculations for the gig
//! driver earnings calculator.
//!
//! Users sign in with Google; the server keeps authoritative, revocable
//! sessions and scopes every saved calculation to its owning account.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{AccountResolver, GoogleIdTokenVerifier, GoogleOAuthClient, SessionManager};
use std::sync::Arc;
use time_utils::{Clock, SystemClock};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub sessions: SessionManager,
    pub accounts: AccountResolver,
    pub id_verifier: Arc<GoogleIdTokenVerifier>,
    pub oauth: GoogleOAuthClient,
    /// Source of "now" for sessions, sign-ins and record timestamps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        id_verifier: Arc<GoogleIdTokenVerifier>,
    ) -> anyhow::Result<Self> {
        Self::with_clock(config, db, id_verifier, Arc::new(SystemClock))
    }

    /// Build state with an explicit clock for expiry decisions and timestamps.
    pub fn with_clock(
        config: Config,
        db: Database,
        id_verifier: Arc<GoogleIdTokenVerifier>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let sessions =
            SessionManager::with_clock(db.clone(), config.session_policy.clone(), clock.clone());
        let accounts = AccountResolver::with_clock(db.clone(), clock.clone());
        let oauth = GoogleOAuthClient::new(&config, id_verifier.clone())?;

        Ok(Self {
            config,
            db,
            sessions,
            accounts,
            id_verifier,
            oauth,
            clock,
        })
    }
}
