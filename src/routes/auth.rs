// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in routes and session status/logout.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{cookie::CookieJar, WithRejection};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{
    clear_nonce_cookie, clear_session_cookie, nonce_cookie, session_cookie, OAUTH_NONCE_COOKIE,
    SESSION_COOKIE,
};
use crate::models::{Account, VerifiedIdentity};
use crate::services::sessions::SessionError;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Maximum age of an OAuth state parameter.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(auth_start).post(sign_in_with_credential))
        .route("/auth/google/callback", get(auth_callback))
        .route("/auth/status", get(auth_status))
        .route("/auth/logout", post(logout))
}

/// Public view of an account.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
}

impl From<&Account> for UserSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.display_name.clone(),
            picture_url: account.picture_url.clone(),
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

// ─── OAuth state ─────────────────────────────────────────────

/// Decoded, verified contents of the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OAuthState {
    return_path: String,
    remember: bool,
    nonce: String,
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn sign(payload: &str, key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Encode `return_path|remember|nonce|timestamp_hex|signature_hex` as URL-safe base64.
fn encode_state(state: &OAuthState, issued_ms: u128, key: &[u8]) -> Result<String> {
    let payload = format!(
        "{}|{}|{}|{:x}",
        state.return_path,
        u8::from(state.remember),
        state.nonce,
        issued_ms
    );
    let signature = sign(&payload, key)?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{payload}|{signature}")))
}

/// Verify signature and age of the OAuth state parameter.
fn decode_state(raw: &str, key: &[u8], now_ms: u128) -> Option<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let (payload, signature_hex) = state_str.rsplit_once('|')?;
    let expected = sign(payload, key).ok()?;
    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::warn!("OAuth state signature mismatch");
        return None;
    }

    let parts: Vec<&str> = payload.split('|').collect();
    let [return_path, remember, nonce, timestamp_hex] = parts.as_slice() else {
        return None;
    };

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS {
        tracing::info!("OAuth state expired");
        return None;
    }

    Some(OAuthState {
        return_path: return_path.to_string(),
        remember: *remember == "1",
        nonce: nonce.to_string(),
    })
}

/// Accept only same-origin relative paths as post-sign-in destinations.
fn sanitize_return_path(raw: Option<&str>) -> String {
    match raw {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains(['|', '\\'])
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn generate_nonce() -> Result<String> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Frontend URL with a status query appended to `path`.
fn frontend_redirect(frontend_url: &str, path: &str, query: &str) -> Redirect {
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::temporary(&format!("{frontend_url}{path}{separator}{query}"))
}

// ─── Redirect flow ───────────────────────────────────────────

/// Query parameters for starting the OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    #[serde(default)]
    remember: bool,
    /// Frontend path to land on after sign-in.
    #[serde(default)]
    return_to: Option<String>,
}

/// Start OAuth flow - redirect to Google's consent screen.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Query(params), _): WithRejection<Query<AuthStartParams>, AppError>,
) -> Result<(CookieJar, Redirect)> {
    let oauth_state = OAuthState {
        return_path: sanitize_return_path(params.return_to.as_deref()),
        remember: params.remember,
        nonce: generate_nonce()?,
    };

    let encoded = encode_state(&oauth_state, now_millis()?, &state.config.oauth_state_key)?;
    let auth_url = state
        .oauth
        .authorization_url(&state.config.oauth_callback_url(), &encoded);

    tracing::info!(
        remember = oauth_state.remember,
        return_path = %oauth_state.return_path,
        "Starting OAuth flow, redirecting to Google"
    );

    let cookie = nonce_cookie(
        oauth_state.nonce,
        (STATE_MAX_AGE_MS / 1000) as u64,
        state.config.cookie_secure(),
    );
    Ok((jar.add(cookie), Redirect::temporary(&auth_url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map a sign-in failure to the error code shown by the frontend.
fn failure_code(err: &AppError) -> &'static str {
    if err.is_transient() {
        "temporarily_unavailable"
    } else {
        "sign_in_failed"
    }
}

/// OAuth callback - exchange code, resolve account, start a session.
///
/// Always answers with a redirect to the frontend; the session handle only
/// ever travels in the cookie.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let secure = state.config.cookie_secure();
    let frontend = state.config.frontend_url.as_str();
    let jar_without_nonce = jar.clone().add(clear_nonce_cookie(secure));

    let verified = params.state.as_deref().and_then(|raw| {
        decode_state(
            raw,
            &state.config.oauth_state_key,
            now_millis().unwrap_or_default(),
        )
    });
    let nonce_matches = match (&verified, jar.get(OAUTH_NONCE_COOKIE)) {
        (Some(s), Some(cookie)) => bool::from(s.nonce.as_bytes().ct_eq(cookie.value().as_bytes())),
        _ => false,
    };

    let oauth_state = match verified {
        Some(s) if nonce_matches => s,
        _ => {
            tracing::warn!("Invalid, expired or unbound OAuth state");
            return (
                jar_without_nonce,
                frontend_redirect(frontend, "/", "error=invalid_state"),
            )
                .into_response();
        }
    };

    if let Some(error) = params.error {
        tracing::info!(error = %error, "OAuth error from Google");
        return (
            jar_without_nonce,
            frontend_redirect(frontend, &oauth_state.return_path, "error=access_denied"),
        )
            .into_response();
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            jar_without_nonce,
            frontend_redirect(frontend, &oauth_state.return_path, "error=sign_in_failed"),
        )
            .into_response();
    };

    let signed_in = async {
        let identity = state
            .oauth
            .exchange_code(&code, &state.config.oauth_callback_url())
            .await?;
        start_session(&state, &identity, oauth_state.remember).await
    }
    .await;

    match signed_in {
        Ok((handle, ttl_secs, _account)) => {
            let jar = jar_without_nonce.add(session_cookie(handle, ttl_secs, secure));
            (
                jar,
                frontend_redirect(frontend, &oauth_state.return_path, "auth=success"),
            )
                .into_response()
        }
        Err(err) => {
            let code = failure_code(&err);
            tracing::warn!(error = %err, code, "OAuth sign-in failed");
            (
                jar_without_nonce,
                frontend_redirect(frontend, &oauth_state.return_path, &format!("error={code}")),
            )
                .into_response()
        }
    }
}

/// Resolve the account and issue a session; returns `(handle, ttl_secs, account)`.
async fn start_session(
    state: &AppState,
    identity: &VerifiedIdentity,
    remember: bool,
) -> Result<(String, u64, Account)> {
    let account = state.accounts.resolve(identity).await?;
    let issued = state.sessions.issue(&account.id, remember).await?;

    tracing::info!(account_id = %account.id, "Sign-in successful");
    Ok((issued.handle, issued.session.ttl_secs, account))
}

// ─── Credential (popup / One Tap) flow ───────────────────────

#[derive(Deserialize)]
pub struct CredentialRequest {
    /// Google ID token
    credential: String,
    #[serde(default)]
    remember_me: bool,
}

/// Sign in with a Google ID token obtained client-side.
async fn sign_in_with_credential(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(body), _): WithRejection<Json<CredentialRequest>, AppError>,
) -> Result<(CookieJar, Json<AuthStatusResponse>)> {
    let identity = state.id_verifier.verify(&body.credential).await?;
    let (handle, ttl_secs, account) = start_session(&state, &identity, body.remember_me).await?;

    let jar = jar.add(session_cookie(handle, ttl_secs, state.config.cookie_secure()));
    Ok((
        jar,
        Json(AuthStatusResponse {
            authenticated: true,
            user: Some(UserSummary::from(&account)),
        }),
    ))
}

// ─── Status & logout ─────────────────────────────────────────

/// Report whether the caller holds a live session.
async fn auth_status(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthStatusResponse>)> {
    let anonymous = Json(AuthStatusResponse {
        authenticated: false,
        user: None,
    });

    let Some(handle) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok((jar, anonymous));
    };

    let session = match state.sessions.validate(&handle).await {
        Ok(session) => session,
        Err(SessionError::Store(e)) => return Err(e),
        Err(_) => {
            let jar = jar.add(clear_session_cookie(state.config.cookie_secure()));
            return Ok((jar, anonymous));
        }
    };

    match state.db.get_account(&session.account_id).await? {
        Some(account) => Ok((
            jar,
            Json(AuthStatusResponse {
                authenticated: true,
                user: Some(UserSummary::from(&account)),
            }),
        )),
        None => Ok((jar, anonymous)),
    }
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Revoke the caller's session and clear the cookie. Idempotent.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar, Json<LogoutResponse>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.revoke(cookie.value()).await?;
        tracing::info!("Session revoked");
    }

    let jar = jar.add(clear_session_cookie(state.config.cookie_secure()));
    Ok((StatusCode::OK, jar, Json(LogoutResponse { success: true })))
}
