// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Provider and store details never reach the client: variants carrying a
/// message either log it here or return it only for `BadRequest`/`NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Session missing, expired or revoked.
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid identity credential: {0}")]
    InvalidCredential(String),

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Timeout or connection failure talking to the provider or the store.
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

/// Malformed or incomplete JSON bodies use the common error format.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", None),
            AppError::InvalidCredential(msg) => {
                tracing::info!(reason = %msg, "Rejected identity credential");
                (StatusCode::UNAUTHORIZED, "sign_in_failed", None)
            }
            AppError::ExchangeFailed(msg) => {
                tracing::warn!(provider_error = %msg, "Authorization code exchange rejected");
                (StatusCode::UNAUTHORIZED, "sign_in_failed", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Transient(msg) => {
                tracing::warn!(error = %msg, "Transient upstream failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily_unavailable",
                    None,
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
