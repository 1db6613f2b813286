// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie authentication middleware.

use crate::error::AppError;
use crate::services::sessions::SessionError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

/// Cookie carrying the opaque session handle.
pub const SESSION_COOKIE: &str = "gigcalc_session";

/// Cookie carrying the OAuth state nonce between start and callback.
pub const OAUTH_NONCE_COOKIE: &str = "gigcalc_oauth_nonce";

/// Path the nonce cookie is scoped to.
pub const OAUTH_CALLBACK_PATH: &str = "/auth/google/callback";

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub account_id: String,
    /// Digest of the caller's session handle
    pub session_id: String,
}

/// Middleware that requires a live session.
///
/// Applies the renewal policy and re-issues the cookie when the session's
/// expiry moved.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let handle = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthenticated)?;

    let session = state.sessions.validate(&handle).await?;

    let renewed = match state.sessions.maybe_renew(&handle, &session).await {
        Ok(renewed) => renewed,
        Err(SessionError::Store(e)) => {
            // The session is valid; a failed renewal only delays the extension.
            tracing::warn!(error = %e, "Session renewal failed");
            None
        }
        Err(e) => return Err(e.into()),
    };

    request.extensions_mut().insert(AuthUser {
        account_id: session.account_id.clone(),
        session_id: session.id.clone(),
    });

    let response = next.run(request).await;

    match renewed {
        Some(renewed) => {
            let cookie = session_cookie(handle, renewed.ttl_secs, state.config.cookie_secure());
            Ok((jar.add(cookie), response).into_response())
        }
        None => Ok(response),
    }
}

/// Session cookie with `Max-Age` equal to the session TTL.
pub fn session_cookie(handle: String, ttl_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, handle))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(ttl_secs as i64))
        .build()
}

/// Expired session cookie that makes the browser drop the handle.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::ZERO)
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Short-lived nonce cookie bound to the OAuth callback path.
pub fn nonce_cookie(nonce: String, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_NONCE_COOKIE, nonce))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(OAUTH_CALLBACK_PATH)
        .max_age(time::Duration::seconds(max_age_secs as i64))
        .build()
}

pub fn clear_nonce_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_NONCE_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(OAUTH_CALLBACK_PATH)
        .max_age(time::Duration::ZERO)
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("h".to_string(), 3600, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
    }

    #[test]
    fn clearing_cookie_expires_immediately() {
        let cookie = clear_session_cookie(false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn nonce_cookie_is_scoped_to_callback() {
        let cookie = nonce_cookie("n".to_string(), 600, false);
        assert_eq!(cookie.path(), Some(OAUTH_CALLBACK_PATH));
    }
}
