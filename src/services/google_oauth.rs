// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth authorization-code flow.
//!
//! Handles:
//! - Building the consent-screen redirect
//! - Exchanging the callback code for tokens (single attempt)
//! - Verifying the returned ID token

use crate::config::{Config, GOOGLE_AUTHORIZE_URL};
use crate::models::VerifiedIdentity;
use crate::services::google_oidc::{GoogleIdTokenVerifier, IdentityError};
use serde::Deserialize;
use std::sync::Arc;

/// Google OAuth client for the redirect sign-in flow.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    verifier: Arc<GoogleIdTokenVerifier>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

impl GoogleOAuthClient {
    pub fn new(config: &Config, verifier: Arc<GoogleIdTokenVerifier>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()?;

        Ok(Self {
            http,
            token_url: config.google_token_url.clone(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            verifier,
        })
    }

    /// Consent-screen URL for the given signed state.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            GOOGLE_AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code and verify the resulting ID token.
    ///
    /// The code is single-use, so the exchange is attempted exactly once.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<VerifiedIdentity, IdentityError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::Transient(format!("token request failed: {e}")))?;

        let tokens: TokenResponse = check_response_json(response).await?;

        let id_token = tokens.id_token.ok_or_else(|| {
            IdentityError::ExchangeFailed("token response carried no id_token".to_string())
        })?;

        self.verifier.verify(&id_token).await
    }
}

/// Classify the token endpoint's answer and parse its JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, IdentityError> {
    let status = response.status();

    if status.is_server_error() || status.as_u16() == 429 {
        return Err(IdentityError::Transient(format!(
            "token endpoint returned {status}"
        )));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IdentityError::ExchangeFailed(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| IdentityError::ExchangeFailed(format!("invalid token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey};

    #[test]
    fn authorization_url_carries_state_and_redirect() {
        let config = Config::test_default();
        let verifier = GoogleIdTokenVerifier::new_with_static_key(
            &config,
            "kid",
            Algorithm::HS256,
            DecodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let client = GoogleOAuthClient::new(&config, Arc::new(verifier)).unwrap();

        let url = client.authorization_url(&config.oauth_callback_url(), "abc.def");
        assert!(url.starts_with(GOOGLE_AUTHORIZE_URL));
        assert!(url.contains("state=abc.def"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("scope=openid%20email%20profile"));
    }
}
