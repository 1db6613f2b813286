// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Accounts (profile + preferences, keyed by provider key)
//! - Sessions (keyed by handle digest)
//! - Calculations (keyed by record id, scoped by `account_id`)
//!
//! Conditional writes (session expiry, touch, owner-checked mutations) run
//! inside Firestore transactions so the check uses the stored document, not
//! a value read earlier by the caller.

use crate::db::{collections, CalculationQuery, SessionLookup};
use crate::error::AppError;
use crate::models::{Account, CalculationRecord, CalculationStats, Session, UserPreferences};
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::paths;
use futures_util::{stream, FutureExt, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Map a Firestore error into the application taxonomy.
fn db_err(e: FirestoreError) -> AppError {
    match e {
        FirestoreError::NetworkError(_) => AppError::Transient(e.to_string()),
        _ => AppError::Database(e.to_string()),
    }
}

/// Change to one of the mutable fields of a calculation record.
#[derive(Debug, Clone)]
enum RecordUpdate {
    Favorite(bool),
    Notes(Option<String>),
}

impl RecordUpdate {
    fn apply(&self, record: &mut CalculationRecord) {
        match self {
            RecordUpdate::Favorite(is_favorite) => record.is_favorite = *is_favorite,
            RecordUpdate::Notes(notes) => record.notes = notes.clone(),
        }
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── Account Operations ──────────────────────────────────────

    /// Create-if-absent keyed on the provider key; on conflict retry as a
    /// profile-only update so a racing sign-in never creates a second account.
    pub async fn upsert_account(&self, candidate: &Account) -> Result<(Account, bool), AppError> {
        let key = candidate.provider_key();

        let created: Result<Account, FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collections::ACCOUNTS)
            .document_id(&key)
            .object(candidate)
            .execute()
            .await;

        match created {
            Ok(account) => Ok((account, true)),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(provider_key = %key, "Account exists, updating profile");
                let account: Account = self
                    .client
                    .fluent()
                    .update()
                    .fields(paths!(Account::{email, display_name, picture_url, last_login_at}))
                    .in_col(collections::ACCOUNTS)
                    .document_id(&key)
                    .object(candidate)
                    .execute()
                    .await
                    .map_err(db_err)?;
                Ok((account, false))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    /// Find the provider key document for an internal account id.
    async fn account_by_id(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        let account_id = account_id.to_string();
        let mut accounts: Vec<Account> = self
            .client
            .fluent()
            .select()
            .from(collections::ACCOUNTS)
            .filter(move |q| q.field("id").eq(account_id.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(accounts.pop())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        self.account_by_id(account_id).await
    }

    pub async fn set_preferences(
        &self,
        account_id: &str,
        preferences: &UserPreferences,
    ) -> Result<bool, AppError> {
        let Some(mut account) = self.account_by_id(account_id).await? else {
            return Ok(false);
        };
        account.preferences = preferences.clone();

        let _: Account = self
            .client
            .fluent()
            .update()
            .fields(paths!(Account::{preferences}))
            .in_col(collections::ACCOUNTS)
            .document_id(account.provider_key())
            .object(&account)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(true)
    }

    // ─── Session Operations ──────────────────────────────────────

    pub async fn insert_session(&self, session: &Session) -> Result<bool, AppError> {
        let created: Result<Session, FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collections::SESSIONS)
            .document_id(&session.id)
            .object(session)
            .execute()
            .await;

        match created {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(db_err(e)),
        }
    }

    pub async fn lookup_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionLookup, AppError> {
        let session_id = session_id.to_string();

        self.client
            .run_transaction(|db, transaction| {
                let session_id = session_id.clone();
                async move {
                    let session: Option<Session> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&session_id)
                        .await?;

                    let Some(session) = session else {
                        return Ok(SessionLookup::Missing);
                    };

                    if session.is_expired(now) {
                        db.fluent()
                            .delete()
                            .from(collections::SESSIONS)
                            .document_id(&session_id)
                            .add_to_transaction(transaction)?;
                        return Ok(SessionLookup::Expired);
                    }

                    Ok(SessionLookup::Active(session))
                }
                .boxed()
            })
            .await
            .map_err(db_err)
    }

    pub async fn touch_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionLookup, AppError> {
        let session_id = session_id.to_string();

        self.client
            .run_transaction(|db, transaction| {
                let session_id = session_id.clone();
                async move {
                    let session: Option<Session> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SESSIONS)
                        .obj()
                        .one(&session_id)
                        .await?;

                    let Some(mut session) = session else {
                        return Ok(SessionLookup::Missing);
                    };

                    if session.is_expired(now) {
                        db.fluent()
                            .delete()
                            .from(collections::SESSIONS)
                            .document_id(&session_id)
                            .add_to_transaction(transaction)?;
                        return Ok(SessionLookup::Expired);
                    }

                    session.renew(now);
                    db.fluent()
                        .update()
                        .fields(paths!(Session::{expires_at, last_touched_at}))
                        .in_col(collections::SESSIONS)
                        .document_id(&session_id)
                        .object(&session)
                        .add_to_transaction(transaction)?;

                    Ok(SessionLookup::Active(session))
                }
                .boxed()
            })
            .await
            .map_err(db_err)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collections::SESSIONS)
            .document_id(session_id)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Purge expired sessions.
    ///
    /// Candidates come from a query, but each delete re-reads the document in
    /// its own transaction and only deletes if it is still expired, so a
    /// concurrent touch wins.
    pub async fn sweep_sessions(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff = now.timestamp_millis();
        let candidates: Vec<Session> = self
            .client
            .fluent()
            .select()
            .from(collections::SESSIONS)
            .filter(move |q| q.field("expires_at").less_than(cutoff))
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        let client = &self.client;
        let results = stream::iter(candidates)
            .map(|candidate| async move {
                client
                    .run_transaction(|db, transaction| {
                        let session_id = candidate.id.clone();
                        async move {
                            let current: Option<Session> = db
                                .fluent()
                                .select()
                                .by_id_in(collections::SESSIONS)
                                .obj()
                                .one(&session_id)
                                .await?;

                            match current {
                                Some(session) if session.expires_at < now => {
                                    db.fluent()
                                        .delete()
                                        .from(collections::SESSIONS)
                                        .document_id(&session_id)
                                        .add_to_transaction(transaction)?;
                                    Ok(true)
                                }
                                _ => Ok(false),
                            }
                        }
                        .boxed()
                    })
                    .await
                    .map_err(db_err)
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<bool, AppError>>>()
            .await;

        let mut purged = 0;
        for result in results {
            if result? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    // ─── Calculation Operations ──────────────────────────────────

    pub async fn insert_calculation(&self, record: &CalculationRecord) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::CALCULATIONS)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_calculation(
        &self,
        account_id: &str,
        calculation_id: &str,
    ) -> Result<Option<CalculationRecord>, AppError> {
        let record: Option<CalculationRecord> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::CALCULATIONS)
            .obj()
            .one(calculation_id)
            .await
            .map_err(db_err)?;

        Ok(record.filter(|r| r.account_id == account_id))
    }

    pub async fn list_calculations(
        &self,
        account_id: &str,
        query: CalculationQuery,
    ) -> Result<Vec<CalculationRecord>, AppError> {
        let account_id = account_id.to_string();
        let select = self
            .client
            .fluent()
            .select()
            .from(collections::CALCULATIONS);

        let select = if query.favorites_only {
            select.filter(move |q| {
                q.for_all([
                    q.field("account_id").eq(account_id.clone()),
                    q.field("is_favorite").eq(true),
                ])
            })
        } else {
            select.filter(move |q| q.field("account_id").eq(account_id.clone()))
        };

        select
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(query.limit)
            .offset(query.offset)
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    pub async fn set_favorite(
        &self,
        account_id: &str,
        calculation_id: &str,
        is_favorite: bool,
    ) -> Result<Option<CalculationRecord>, AppError> {
        self.update_owned(account_id, calculation_id, RecordUpdate::Favorite(is_favorite))
            .await
    }

    pub async fn set_notes(
        &self,
        account_id: &str,
        calculation_id: &str,
        notes: Option<String>,
    ) -> Result<Option<CalculationRecord>, AppError> {
        self.update_owned(account_id, calculation_id, RecordUpdate::Notes(notes))
            .await
    }

    /// Apply an update to the mutable fields of a record the caller owns.
    async fn update_owned(
        &self,
        account_id: &str,
        calculation_id: &str,
        update: RecordUpdate,
    ) -> Result<Option<CalculationRecord>, AppError> {
        let account_id = account_id.to_string();
        let calculation_id = calculation_id.to_string();

        self.client
            .run_transaction(|db, transaction| {
                let account_id = account_id.clone();
                let calculation_id = calculation_id.clone();
                let update = update.clone();
                async move {
                    let record: Option<CalculationRecord> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CALCULATIONS)
                        .obj()
                        .one(&calculation_id)
                        .await?;

                    let Some(mut record) = record.filter(|r| r.account_id == account_id) else {
                        return Ok(None);
                    };

                    update.apply(&mut record);
                    db.fluent()
                        .update()
                        .fields(paths!(CalculationRecord::{is_favorite, notes}))
                        .in_col(collections::CALCULATIONS)
                        .document_id(&calculation_id)
                        .object(&record)
                        .add_to_transaction(transaction)?;

                    Ok(Some(record))
                }
                .boxed()
            })
            .await
            .map_err(db_err)
    }

    pub async fn delete_calculation(
        &self,
        account_id: &str,
        calculation_id: &str,
    ) -> Result<bool, AppError> {
        let account_id = account_id.to_string();
        let calculation_id = calculation_id.to_string();

        self.client
            .run_transaction(|db, transaction| {
                let account_id = account_id.clone();
                let calculation_id = calculation_id.clone();
                async move {
                    let record: Option<CalculationRecord> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CALCULATIONS)
                        .obj()
                        .one(&calculation_id)
                        .await?;

                    if !record.is_some_and(|r| r.account_id == account_id) {
                        return Ok(false);
                    }

                    db.fluent()
                        .delete()
                        .from(collections::CALCULATIONS)
                        .document_id(&calculation_id)
                        .add_to_transaction(transaction)?;
                    Ok(true)
                }
                .boxed()
            })
            .await
            .map_err(db_err)
    }

    /// Aggregate an account's calculations.
    ///
    /// Reads every record; accounts hold at most a few hundred.
    pub async fn calculation_stats(&self, account_id: &str) -> Result<CalculationStats, AppError> {
        let account_id = account_id.to_string();
        let records: Vec<CalculationRecord> = self
            .client
            .fluent()
            .select()
            .from(collections::CALCULATIONS)
            .filter(move |q| q.field("account_id").eq(account_id.clone()))
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(CalculationStats::from_records(&records))
    }
}
