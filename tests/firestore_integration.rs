// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (`FIRESTORE_EMULATOR_HOST`); they are skipped otherwise.

use chrono::{Duration, Utc};
use gigcalc_api::db::{CalculationQuery, SessionLookup};
use gigcalc_api::models::{
    Account, CalculationInputs, CalculationRecord, CalculationResults, Session, UserPreferences,
};

mod common;
use common::test_firestore;

/// Unique suffix for test isolation.
fn unique() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn test_account(sub: &str, email: &str) -> Account {
    let now = Utc::now();
    Account {
        id: unique(),
        provider: "google".to_string(),
        provider_user_id: sub.to_string(),
        email: email.to_string(),
        display_name: "Test Driver".to_string(),
        picture_url: None,
        created_at: now,
        last_login_at: now,
        preferences: UserPreferences::default(),
    }
}

fn test_session(expires_in: Duration) -> Session {
    let now = Utc::now();
    Session {
        id: unique(),
        account_id: unique(),
        issued_at: now,
        expires_at: now + expires_in,
        last_touched_at: now,
        ttl_secs: 3600,
    }
}

fn test_record(account_id: &str, score: i32) -> CalculationRecord {
    CalculationRecord {
        id: unique(),
        account_id: account_id.to_string(),
        inputs: CalculationInputs {
            distance_miles: 30.0,
            time_hours: 2.0,
            earnings: 60.0,
            fuel_price: 3.5,
            fuel_efficiency: 25.0,
            depreciation_rate: 0.1,
            tax_rate: 15.3,
        },
        results: CalculationResults {
            gross_hourly: 30.0,
            net_hourly: 22.0,
            fuel_cost: 4.2,
            depreciation_cost: 3.0,
            estimated_tax: 9.18,
            gross_per_mile: 2.0,
            net_per_mile: 1.46,
        },
        score,
        grade: "B".to_string(),
        notes: None,
        is_favorite: false,
        created_at: Utc::now(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCOUNT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_account_upsert_is_keyed_by_provider_id() {
    require_emulator!();
    let db = test_firestore().await;
    let sub = format!("g-{}", unique());

    let first = test_account(&sub, "a@x.com");
    let (stored, created) = db.upsert_account(&first).await.unwrap();
    assert!(created);
    assert_eq!(stored.id, first.id);

    let mut prefs = UserPreferences::default();
    prefs.currency = "EUR".to_string();
    assert!(db.set_preferences(&first.id, &prefs).await.unwrap());

    let second = test_account(&sub, "b@x.com");
    let (stored, created) = db.upsert_account(&second).await.unwrap();
    assert!(!created);
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.email, "b@x.com");
    assert_eq!(stored.preferences.currency, "EUR");

    let fetched = db.get_account(&first.id).await.unwrap().unwrap();
    assert_eq!(fetched.email, "b@x.com");
    assert!(db.get_account(&second.id).await.unwrap().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_session_lifecycle() {
    require_emulator!();
    let db = test_firestore().await;
    let session = test_session(Duration::seconds(60));

    assert!(db.insert_session(&session).await.unwrap());
    assert!(!db.insert_session(&session).await.unwrap());

    let now = Utc::now();
    assert!(matches!(
        db.lookup_session(&session.id, now).await.unwrap(),
        SessionLookup::Active(_)
    ));

    let later = now + Duration::seconds(30);
    match db.touch_session(&session.id, later).await.unwrap() {
        SessionLookup::Active(s) => assert!(s.expires_at >= later + Duration::seconds(3599)),
        other => panic!("expected active session, got {other:?}"),
    }

    db.delete_session(&session.id).await.unwrap();
    db.delete_session(&session.id).await.unwrap();
    assert_eq!(
        db.lookup_session(&session.id, now).await.unwrap(),
        SessionLookup::Missing
    );
}

#[tokio::test]
async fn test_expired_session_is_destroyed_on_lookup() {
    require_emulator!();
    let db = test_firestore().await;
    let session = test_session(Duration::seconds(1));
    db.insert_session(&session).await.unwrap();

    let after = session.expires_at + Duration::seconds(1);
    assert_eq!(
        db.lookup_session(&session.id, after).await.unwrap(),
        SessionLookup::Expired
    );
    assert_eq!(
        db.lookup_session(&session.id, session.issued_at).await.unwrap(),
        SessionLookup::Missing
    );
}

#[tokio::test]
async fn test_sweep_spares_renewed_sessions() {
    require_emulator!();
    let db = test_firestore().await;
    let stale = test_session(Duration::seconds(1));
    let renewed = test_session(Duration::seconds(1));
    db.insert_session(&stale).await.unwrap();
    db.insert_session(&renewed).await.unwrap();

    db.touch_session(&renewed.id, Utc::now()).await.unwrap();

    let later = Utc::now() + Duration::seconds(5);
    assert!(db.sweep_sessions(later).await.unwrap() >= 1);
    assert!(matches!(
        db.lookup_session(&renewed.id, later).await.unwrap(),
        SessionLookup::Active(_)
    ));
    assert_eq!(
        db.lookup_session(&stale.id, later).await.unwrap(),
        SessionLookup::Missing
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CALCULATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_calculations_scoped_by_owner() {
    require_emulator!();
    let db = test_firestore().await;
    let alice = unique();
    let bob = unique();

    let record = test_record(&alice, 80);
    db.insert_calculation(&record).await.unwrap();

    assert!(db.get_calculation(&bob, &record.id).await.unwrap().is_none());
    assert!(db
        .set_favorite(&bob, &record.id, true)
        .await
        .unwrap()
        .is_none());
    assert!(!db.delete_calculation(&bob, &record.id).await.unwrap());

    let updated = db
        .set_notes(&alice, &record.id, Some("lunch shift".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.notes.as_deref(), Some("lunch shift"));
    assert!(db.delete_calculation(&alice, &record.id).await.unwrap());
}

#[tokio::test]
async fn test_favorites_listing_and_stats() {
    require_emulator!();
    let db = test_firestore().await;
    let owner = unique();

    let mut ids = Vec::new();
    for score in [60, 70, 80] {
        let record = test_record(&owner, score);
        ids.push(record.id.clone());
        db.insert_calculation(&record).await.unwrap();
    }
    db.set_favorite(&owner, &ids[0], true).await.unwrap();

    let favorites = db
        .list_calculations(
            &owner,
            CalculationQuery {
                favorites_only: true,
                limit: 20,
                offset: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, ids[0]);

    let stats = db.calculation_stats(&owner).await.unwrap();
    assert_eq!(stats.total_calculations, 3);
    assert_eq!(stats.favorite_count, 1);
    assert_eq!(stats.best_score, Some(80));
}
