// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use gigcalc_api::config::Config;
use gigcalc_api::db::{Database, FirestoreDb};
use gigcalc_api::routes::create_router;
use gigcalc_api::services::GoogleIdTokenVerifier;
use gigcalc_api::time_utils::ManualClock;
use gigcalc_api::AppState;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// Key id and secret of the static ID token verifier used in tests.
pub const TEST_KID: &str = "test-kid";
pub const TEST_ID_TOKEN_SECRET: &[u8] = b"integration-id-token-secret";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection against the emulator.
#[allow(dead_code)]
pub async fn test_firestore() -> Database {
    let db = FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator");
    Database::firestore(db, Duration::from_secs(10))
}

/// Test app on the in-memory backend with a manual session clock.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Sign in through `POST /auth/google` and return the `Cookie` header value.
    pub async fn sign_in(&self, sub: &str, email: &str) -> String {
        let token = id_token(&self.state.config, sub, email);
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/auth/google")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "credential": token }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), 200, "sign-in should succeed");
        session_cookie_pair(&response).expect("sign-in should set the session cookie")
    }
}

#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

/// Build an app with the given config on a fresh in-memory store.
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let db = Database::in_memory(config.store_timeout);
    let verifier = GoogleIdTokenVerifier::new_with_static_key(
        &config,
        TEST_KID,
        Algorithm::HS256,
        DecodingKey::from_secret(TEST_ID_TOKEN_SECRET),
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = Arc::new(
        AppState::with_clock(config, db, Arc::new(verifier), clock.clone()).unwrap(),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
    }
}

/// Google-shaped ID token signed with the test secret.
#[allow(dead_code)]
pub fn id_token(config: &Config, sub: &str, email: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": config.google_client_id,
        "sub": sub,
        "iat": now,
        "exp": now + 3600,
        "email": email,
        "email_verified": true,
        "name": "Test Driver",
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(TEST_ID_TOKEN_SECRET)).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
}

/// `name=value` of the session cookie set by `response`, if any.
#[allow(dead_code)]
pub fn session_cookie_pair(response: &Response) -> Option<String> {
    let header = find_cookie(&set_cookie_headers(response), "gigcalc_session")?;
    header.split(';').next().map(|s| s.to_string())
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// JSON request carrying the session cookie.
#[allow(dead_code)]
pub fn authed_json(method: &str, uri: &str, cookie: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn authed(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

/// Body for `POST /api/calculations`.
#[allow(dead_code)]
pub fn calculation_body(score: i32) -> serde_json::Value {
    serde_json::json!({
        "inputs": {
            "distance_miles": 42.0,
            "time_hours": 3.5,
            "earnings": 96.25,
            "fuel_price": 3.50,
            "fuel_efficiency": 25.0,
            "depreciation_rate": 0.10,
            "tax_rate": 15.3
        },
        "results": {
            "gross_hourly": 27.5,
            "net_hourly": 20.1,
            "fuel_cost": 5.88,
            "depreciation_cost": 4.2,
            "estimated_tax": 14.73,
            "gross_per_mile": 2.29,
            "net_per_mile": 1.67
        },
        "score": score
    })
}
