// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read once at startup and cached in `Config`.

use crate::services::grading::GradeScale;
use crate::services::sessions::{RenewalPolicy, SessionPolicy, MAX_SESSION_TTL};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    /// Process-local maps; for local runs and tests.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", raw.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public, also the ID token audience)
    pub google_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Public base URL of this API (used for the OAuth callback URI)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub storage_backend: StorageBackend,
    /// Token endpoint for the authorization-code exchange
    pub google_token_url: String,

    // --- Session policy ---
    pub session_policy: SessionPolicy,
    /// Interval of the expired-session purge; zero disables it.
    pub session_sweep_interval: Duration,

    // --- Timeouts ---
    pub provider_timeout: Duration,
    pub store_timeout: Duration,

    pub grade_scale: GradeScale,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// HMAC key for the OAuth state parameter (raw bytes)
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            session_policy: SessionPolicy::default(),
            session_sweep_interval: Duration::ZERO,
            provider_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(5),
            grade_scale: GradeScale::default(),
            google_client_secret: "test_secret".to_string(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let renewal = match env::var("SESSION_RENEWAL") {
            Ok(raw) => raw
                .parse::<RenewalPolicy>()
                .map_err(|_| ConfigError::Invalid("SESSION_RENEWAL", raw))?,
            Err(_) => RenewalPolicy::default(),
        };

        let session_policy = SessionPolicy {
            ttl: session_ttl(
                "SESSION_TTL_SECS",
                env_or("SESSION_TTL_SECS", 24 * 60 * 60)?,
            )?,
            remember_ttl: session_ttl(
                "SESSION_REMEMBER_TTL_SECS",
                env_or("SESSION_REMEMBER_TTL_SECS", 30 * 24 * 60 * 60)?,
            )?,
            renewal,
        };

        let grade_scale = match env::var("GRADE_THRESHOLDS") {
            Ok(raw) => raw
                .parse::<GradeScale>()
                .map_err(|e| ConfigError::Invalid("GRADE_THRESHOLDS", e.to_string()))?,
            Err(_) => GradeScale::default(),
        };

        Ok(Self {
            // Non-sensitive config from env
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_url: env::var("API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StorageBackend::Firestore))?,
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),

            session_policy,
            session_sweep_interval: Duration::from_secs(env_or(
                "SESSION_SWEEP_INTERVAL_SECS",
                60 * 60,
            )?),

            provider_timeout: Duration::from_millis(env_or("PROVIDER_TIMEOUT_MS", 5_000)?),
            store_timeout: Duration::from_millis(env_or("STORE_TIMEOUT_MS", 5_000)?),

            grade_scale,

            // Secrets
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn cookie_secure(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }

    /// Redirect URI registered with Google for the authorization-code flow.
    pub fn oauth_callback_url(&self) -> String {
        format!("{}/auth/google/callback", self.api_url)
    }
}

/// Read a numeric env var, falling back to `default` when unset.
fn env_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Session TTLs must be positive and no longer than [`MAX_SESSION_TTL`].
fn session_ttl(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    let ttl = Duration::from_secs(secs);
    if ttl.is_zero() || ttl > MAX_SESSION_TTL {
        return Err(ConfigError::Invalid(
            name,
            format!(
                "{secs} (must be between 1 and {})",
                MAX_SESSION_TTL.as_secs()
            ),
        ));
    }
    Ok(ttl)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
