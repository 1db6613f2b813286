// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google ID token verification for sign-in.

use crate::config::Config;
use crate::error::AppError;
use crate::models::account::PROVIDER_GOOGLE;
use crate::models::VerifiedIdentity;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// Identity verification failure categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// Credential is malformed, forged, expired or for another audience.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    /// Provider rejected the authorization code.
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),
    /// Provider unreachable or timed out; the user may retry.
    #[error("provider unavailable: {0}")]
    Transient(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredential(msg) => AppError::InvalidCredential(msg),
            IdentityError::ExchangeFailed(msg) => AppError::ExchangeFailed(msg),
            IdentityError::Transient(msg) => AppError::Transient(msg),
        }
    }
}

#[derive(Clone)]
enum VerifierMode {
    Google,
    StaticKey {
        kid: String,
        algorithm: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-issued ID tokens presented at sign-in.
pub struct GoogleIdTokenVerifier {
    http_client: reqwest::Client,
    expected_audience: String,
    mode: VerifierMode,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl GoogleIdTokenVerifier {
    /// Create a production verifier that discovers and caches Google JWKS keys.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::build(config, VerifierMode::Google)?;

        tracing::info!(
            expected_audience = %verifier.expected_audience,
            "Initialized Google ID token verifier"
        );

        Ok(verifier)
    }

    /// Create a verifier that trusts a single static key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static verifier kid must not be empty");
        }

        Self::build(
            config,
            VerifierMode::StaticKey {
                kid,
                algorithm,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn build(config: &Config, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()
            .context("failed building ID token HTTP client")?;

        Ok(Self {
            http_client,
            expected_audience: config.google_client_id.clone(),
            mode,
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a Google ID token and extract the identity it asserts.
    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::InvalidCredential(
                "credential is empty".to_string(),
            ));
        }

        let header = decode_header(token)
            .map_err(|e| IdentityError::InvalidCredential(format!("invalid JWT header: {e}")))?;

        let expected_alg = match &self.mode {
            VerifierMode::Google => Algorithm::RS256,
            VerifierMode::StaticKey { algorithm, .. } => *algorithm,
        };
        if header.alg != expected_alg {
            return Err(IdentityError::InvalidCredential(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidCredential("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(expected_alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.expected_audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| IdentityError::InvalidCredential(format!("JWT validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;

        let email = claims
            .email
            .ok_or_else(|| IdentityError::InvalidCredential("missing email claim".to_string()))?;

        if claims.email_verified == Some(false) {
            return Err(IdentityError::InvalidCredential(
                "email_verified claim is false".to_string(),
            ));
        }

        tracing::debug!(subject = %claims.sub, "Verified Google ID token");

        Ok(VerifiedIdentity {
            provider: PROVIDER_GOOGLE.to_string(),
            provider_user_id: claims.sub,
            display_name: claims.name.unwrap_or_else(|| email.clone()),
            email,
            picture_url: claims.picture,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, IdentityError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
            ..
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }

            return Err(IdentityError::InvalidCredential(format!(
                "unknown JWT kid for static verifier: {kid}"
            )));
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(IdentityError::InvalidCredential(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), IdentityError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await?;

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(IdentityError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Google JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, IdentityError> {
        let cached_jwks_uri = {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| !force_refresh && entry.expires_at > Instant::now())
            {
                return Ok(entry.jwks_uri.clone());
            }
            cache.as_ref().map(|entry| entry.jwks_uri.clone())
        };

        match self.http_client.get(DISCOVERY_URL).send().await {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_CACHE_TTL);
                let discovery: OpenIdConfig = resp.json().await.map_err(|e| {
                    IdentityError::Transient(format!("invalid discovery JSON: {e}"))
                })?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

/// Keep RSA signing keys usable for RS256.
fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn validate_iat(iat: Option<usize>) -> Result<(), IdentityError> {
    let Some(iat) = iat else {
        return Err(IdentityError::InvalidCredential(
            "missing iat claim".to_string(),
        ));
    };

    if iat as u64 > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(IdentityError::InvalidCredential(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"id-token-test-secret";
    const KID: &str = "test-kid";

    fn verifier() -> GoogleIdTokenVerifier {
        GoogleIdTokenVerifier::new_with_static_key(
            &Config::test_default(),
            KID,
            Algorithm::HS256,
            DecodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn token(claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.to_string());
        encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn claims(aud: &str) -> serde_json::Value {
        let now = now_unix_secs();
        json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": "g-123",
            "iat": now,
            "exp": now + 600,
            "email": "driver@example.com",
            "email_verified": true,
            "name": "Dee Driver",
        })
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let config = Config::test_default();
        let identity = verifier()
            .verify(&token(claims(&config.google_client_id)))
            .await
            .unwrap();

        assert_eq!(identity.provider, "google");
        assert_eq!(identity.provider_user_id, "g-123");
        assert_eq!(identity.email, "driver@example.com");
        assert_eq!(identity.display_name, "Dee Driver");
    }

    #[tokio::test]
    async fn rejects_wrong_audience() {
        let err = verifier()
            .verify(&token(claims("someone-else")))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let config = Config::test_default();
        let mut c = claims(&config.google_client_id);
        c["exp"] = json!(now_unix_secs() - 3600);
        c["iat"] = json!(now_unix_secs() - 7200);

        let err = verifier().verify(&token(c)).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn rejects_unverified_email_and_garbage() {
        let config = Config::test_default();
        let mut c = claims(&config.google_client_id);
        c["email_verified"] = json!(false);

        assert!(matches!(
            verifier().verify(&token(c)).await,
            Err(IdentityError::InvalidCredential(_))
        ));
        assert!(matches!(
            verifier().verify("not-a-jwt").await,
            Err(IdentityError::InvalidCredential(_))
        ));
        assert!(matches!(
            verifier().verify("").await,
            Err(IdentityError::InvalidCredential(_))
        ));
    }

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=60"), Some(60));
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn identity_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(IdentityError::Transient("t".into())),
            AppError::Transient(_)
        ));
        assert!(matches!(
            AppError::from(IdentityError::ExchangeFailed("x".into())),
            AppError::ExchangeFailed(_)
        ));
    }
}
