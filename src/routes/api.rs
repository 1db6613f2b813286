// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.
//!
//! Every handler takes the account id from the validated session and scopes
//! its store call by it; a record id alone never grants access.

use crate::db::CalculationQuery;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    Account, CalculationInputs, CalculationRecord, CalculationResults, CalculationStats,
    UserPreferences,
};
use crate::routes::auth::UserSummary;
use crate::time_utils::Clock;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;
const MAX_NOTES_LEN: u64 = 2000;

/// API routes (require a session cookie).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/user", get(get_user))
        .route("/api/user/preferences", put(update_preferences))
        .route(
            "/api/calculations",
            get(list_calculations).post(create_calculation),
        )
        .route(
            "/api/calculations/{id}",
            get(get_calculation).delete(delete_calculation),
        )
        .route("/api/calculations/{id}/favorite", put(set_favorite))
        .route("/api/calculations/{id}/notes", put(set_notes))
}

/// Run derive-based validation, reporting failures as `400`.
fn validated<T: Validate>(value: T) -> Result<T> {
    value
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(value)
}

// ─── User Profile ────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user: UserSummary,
    pub preferences: UserPreferences,
    pub stats: CalculationStats,
}

async fn load_account(state: &AppState, user: &AuthUser) -> Result<Account> {
    match state.db.get_account(&user.account_id).await? {
        Some(account) => Ok(account),
        None => {
            tracing::warn!(account_id = %user.account_id, "Session refers to a missing account");
            Err(AppError::Unauthenticated)
        }
    }
}

/// Current account, its preferences and aggregate stats.
async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let account = load_account(&state, &user).await?;
    let stats = state.db.calculation_stats(&account.id).await?;

    Ok(Json(UserResponse {
        user: UserSummary::from(&account),
        preferences: account.preferences,
        stats,
    }))
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(preferences), _): WithRejection<Json<UserPreferences>, AppError>,
) -> Result<Json<UserPreferences>> {
    let preferences = validated(preferences)?;

    if !state
        .db
        .set_preferences(&user.account_id, &preferences)
        .await?
    {
        return Err(AppError::Unauthenticated);
    }

    tracing::debug!(account_id = %user.account_id, "Preferences updated");
    Ok(Json(preferences))
}

// ─── Calculations ────────────────────────────────────────────

/// Body of `POST /api/calculations`. Derived fields are stored as given.
#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreateCalculationRequest {
    pub inputs: CalculationInputs,
    pub results: CalculationResults,
    pub score: i32,
    /// Filled from the grade scale when omitted
    #[validate(length(min = 1, max = 8))]
    pub grade: Option<String>,
    #[validate(length(max = MAX_NOTES_LEN))]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

async fn create_calculation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<CreateCalculationRequest>, AppError>,
) -> Result<impl IntoResponse> {
    let body = validated(body)?;

    let grade = body
        .grade
        .unwrap_or_else(|| state.config.grade_scale.grade_for(body.score).to_string());

    let record = CalculationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: user.account_id.clone(),
        inputs: body.inputs,
        results: body.results,
        score: body.score,
        grade,
        notes: normalize_notes(body.notes),
        is_favorite: body.is_favorite,
        created_at: state.clock.now(),
    };

    state.db.insert_calculation(&record).await?;

    tracing::info!(
        account_id = %user.account_id,
        calculation_id = %record.id,
        score = record.score,
        "Calculation saved"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = MAX_LIMIT))]
    limit: u32,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    favorite_only: bool,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculationListResponse {
    pub calculations: Vec<CalculationRecord>,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

/// Newest-first page of the caller's calculations.
async fn list_calculations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(params), _): WithRejection<Query<ListQuery>, AppError>,
) -> Result<Json<CalculationListResponse>> {
    let params = validated(params)?;

    // Fetch one extra item to determine if another page is available.
    let mut calculations = state
        .db
        .list_calculations(
            &user.account_id,
            CalculationQuery {
                favorites_only: params.favorite_only,
                limit: params.limit + 1,
                offset: params.offset,
            },
        )
        .await?;

    let has_more = calculations.len() > params.limit as usize;
    calculations.truncate(params.limit as usize);

    Ok(Json(CalculationListResponse {
        calculations,
        limit: params.limit,
        offset: params.offset,
        has_more,
    }))
}

fn not_found(calculation_id: &str) -> AppError {
    AppError::NotFound(format!("Calculation {calculation_id} not found"))
}

async fn get_calculation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(calculation_id): Path<String>,
) -> Result<Json<CalculationRecord>> {
    state
        .db
        .get_calculation(&user.account_id, &calculation_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&calculation_id))
}

#[derive(Deserialize)]
struct FavoriteRequest {
    is_favorite: bool,
}

async fn set_favorite(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(calculation_id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<FavoriteRequest>, AppError>,
) -> Result<Json<CalculationRecord>> {
    state
        .db
        .set_favorite(&user.account_id, &calculation_id, body.is_favorite)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&calculation_id))
}

#[derive(Deserialize, Validate)]
struct NotesRequest {
    #[validate(length(max = MAX_NOTES_LEN))]
    notes: Option<String>,
}

async fn set_notes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(calculation_id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<NotesRequest>, AppError>,
) -> Result<Json<CalculationRecord>> {
    let body = validated(body)?;

    state
        .db
        .set_notes(
            &user.account_id,
            &calculation_id,
            normalize_notes(body.notes),
        )
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&calculation_id))
}

async fn delete_calculation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(calculation_id): Path<String>,
) -> Result<StatusCode> {
    if state
        .db
        .delete_calculation(&user.account_id, &calculation_id)
        .await?
    {
        tracing::info!(
            account_id = %user.account_id,
            calculation_id = %calculation_id,
            "Calculation deleted"
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&calculation_id))
    }
}

/// Blank notes are stored as absent.
fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|n| !n.trim().is_empty())
}
