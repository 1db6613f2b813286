// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, or in-memory for local runs and tests).
//!
//! Every call goes through [`Database`], which bounds it with the configured
//! store timeout. A timeout surfaces as [`AppError::Transient`], never as an
//! authentication failure.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use crate::models::{Account, CalculationRecord, CalculationStats, Session, UserPreferences};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Collection names as constants.
pub mod collections {
    /// Accounts keyed by provider key
    pub const ACCOUNTS: &str = "accounts";
    /// Sessions keyed by handle digest
    pub const SESSIONS: &str = "sessions";
    pub const CALCULATIONS: &str = "calculations";
}

/// Result of reading a session by handle digest.
///
/// Expired sessions are destroyed by the same store operation that reports
/// them, so an `Expired` handle reads as `Missing` afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Session),
    Expired,
    Missing,
}

/// Listing filter and page for calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculationQuery {
    pub favorites_only: bool,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone)]
enum Backend {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

/// Storage facade shared by all request handlers.
#[derive(Clone)]
pub struct Database {
    backend: Backend,
    timeout: Duration,
}

impl Database {
    /// Connect to the backend selected in configuration.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        let backend = match config.storage_backend {
            StorageBackend::Firestore => {
                Backend::Firestore(FirestoreDb::new(&config.gcp_project_id).await?)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Backend::Memory(MemoryDb::new())
            }
        };

        Ok(Self {
            backend,
            timeout: config.store_timeout,
        })
    }

    pub fn firestore(db: FirestoreDb, timeout: Duration) -> Self {
        Self {
            backend: Backend::Firestore(db),
            timeout,
        }
    }

    pub fn in_memory(timeout: Duration) -> Self {
        Self {
            backend: Backend::Memory(MemoryDb::new()),
            timeout,
        }
    }

    /// Run one store call under the store timeout.
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Data store call timed out"
                );
                Err(AppError::Transient(format!("data store call '{op}' timed out")))
            }
        }
    }

    // ─── Account Operations ──────────────────────────────────────

    /// Atomically insert `candidate` or, if its provider key already exists,
    /// overwrite only the profile fields and `last_login_at`.
    ///
    /// Returns the stored account and whether it was created.
    pub async fn upsert_account(&self, candidate: &Account) -> Result<(Account, bool), AppError> {
        self.bounded("upsert_account", async {
            match &self.backend {
                Backend::Firestore(db) => db.upsert_account(candidate).await,
                Backend::Memory(db) => Ok(db.upsert_account(candidate)),
            }
        })
        .await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        self.bounded("get_account", async {
            match &self.backend {
                Backend::Firestore(db) => db.get_account(account_id).await,
                Backend::Memory(db) => Ok(db.get_account(account_id)),
            }
        })
        .await
    }

    /// Replace an account's preferences. Returns `false` if the account is gone.
    pub async fn set_preferences(
        &self,
        account_id: &str,
        preferences: &UserPreferences,
    ) -> Result<bool, AppError> {
        self.bounded("set_preferences", async {
            match &self.backend {
                Backend::Firestore(db) => db.set_preferences(account_id, preferences).await,
                Backend::Memory(db) => Ok(db.set_preferences(account_id, preferences)),
            }
        })
        .await
    }

    // ─── Session Operations ──────────────────────────────────────

    /// Create a session; `false` if the digest is already taken.
    pub async fn insert_session(&self, session: &Session) -> Result<bool, AppError> {
        self.bounded("insert_session", async {
            match &self.backend {
                Backend::Firestore(db) => db.insert_session(session).await,
                Backend::Memory(db) => Ok(db.insert_session(session)),
            }
        })
        .await
    }

    /// Read a session, destroying it if it expired before `now`.
    pub async fn lookup_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionLookup, AppError> {
        self.bounded("lookup_session", async {
            match &self.backend {
                Backend::Firestore(db) => db.lookup_session(session_id, now).await,
                Backend::Memory(db) => Ok(db.lookup_session(session_id, now)),
            }
        })
        .await
    }

    /// Extend a live session to `now + ttl`; expired sessions are destroyed.
    pub async fn touch_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionLookup, AppError> {
        self.bounded("touch_session", async {
            match &self.backend {
                Backend::Firestore(db) => db.touch_session(session_id, now).await,
                Backend::Memory(db) => Ok(db.touch_session(session_id, now)),
            }
        })
        .await
    }

    /// Delete a session unconditionally. Absent sessions are not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), AppError> {
        self.bounded("delete_session", async {
            match &self.backend {
                Backend::Firestore(db) => db.delete_session(session_id).await,
                Backend::Memory(db) => {
                    db.delete_session(session_id);
                    Ok(())
                }
            }
        })
        .await
    }

    /// Delete every session whose stored expiry is before `now`.
    pub async fn sweep_sessions(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        // A sweep touches many documents; give it a multiple of the per-call budget.
        let budget = self.timeout.saturating_mul(10);
        let fut = async {
            match &self.backend {
                Backend::Firestore(db) => db.sweep_sessions(now).await,
                Backend::Memory(db) => Ok(db.sweep_sessions(now)),
            }
        };

        tokio::time::timeout(budget, fut)
            .await
            .map_err(|_| AppError::Transient("session sweep timed out".to_string()))?
    }

    // ─── Calculation Operations ──────────────────────────────────

    pub async fn insert_calculation(&self, record: &CalculationRecord) -> Result<(), AppError> {
        self.bounded("insert_calculation", async {
            match &self.backend {
                Backend::Firestore(db) => db.insert_calculation(record).await,
                Backend::Memory(db) => {
                    db.insert_calculation(record);
                    Ok(())
                }
            }
        })
        .await
    }

    /// Fetch a record owned by `account_id`; records of other accounts read as absent.
    pub async fn get_calculation(
        &self,
        account_id: &str,
        calculation_id: &str,
    ) -> Result<Option<CalculationRecord>, AppError> {
        self.bounded("get_calculation", async {
            match &self.backend {
                Backend::Firestore(db) => db.get_calculation(account_id, calculation_id).await,
                Backend::Memory(db) => Ok(db.get_calculation(account_id, calculation_id)),
            }
        })
        .await
    }

    /// Newest-first page of an account's calculations.
    pub async fn list_calculations(
        &self,
        account_id: &str,
        query: CalculationQuery,
    ) -> Result<Vec<CalculationRecord>, AppError> {
        self.bounded("list_calculations", async {
            match &self.backend {
                Backend::Firestore(db) => db.list_calculations(account_id, query).await,
                Backend::Memory(db) => Ok(db.list_calculations(account_id, query)),
            }
        })
        .await
    }

    pub async fn set_favorite(
        &self,
        account_id: &str,
        calculation_id: &str,
        is_favorite: bool,
    ) -> Result<Option<CalculationRecord>, AppError> {
        self.bounded("set_favorite", async {
            match &self.backend {
                Backend::Firestore(db) => {
                    db.set_favorite(account_id, calculation_id, is_favorite)
                        .await
                }
                Backend::Memory(db) => Ok(db.set_favorite(account_id, calculation_id, is_favorite)),
            }
        })
        .await
    }

    pub async fn set_notes(
        &self,
        account_id: &str,
        calculation_id: &str,
        notes: Option<String>,
    ) -> Result<Option<CalculationRecord>, AppError> {
        self.bounded("set_notes", async {
            match &self.backend {
                Backend::Firestore(db) => db.set_notes(account_id, calculation_id, notes).await,
                Backend::Memory(db) => Ok(db.set_notes(account_id, calculation_id, notes)),
            }
        })
        .await
    }

    /// Delete a record owned by `account_id`. Returns `false` if absent or not owned.
    pub async fn delete_calculation(
        &self,
        account_id: &str,
        calculation_id: &str,
    ) -> Result<bool, AppError> {
        self.bounded("delete_calculation", async {
            match &self.backend {
                Backend::Firestore(db) => db.delete_calculation(account_id, calculation_id).await,
                Backend::Memory(db) => Ok(db.delete_calculation(account_id, calculation_id)),
            }
        })
        .await
    }

    pub async fn calculation_stats(&self, account_id: &str) -> Result<CalculationStats, AppError> {
        self.bounded("calculation_stats", async {
            match &self.backend {
                Backend::Firestore(db) => db.calculation_stats(account_id).await,
                Backend::Memory(db) => Ok(db.calculation_stats(account_id)),
            }
        })
        .await
    }
}
