// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store backed by `DashMap`.
//!
//! Each operation is a single per-key map operation, which gives the same
//! atomicity the Firestore backend gets from create-if-absent and
//! transactions. Used for local runs and tests.

use crate::db::{CalculationQuery, SessionLookup};
use crate::models::{Account, CalculationRecord, CalculationStats, Session, UserPreferences};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    /// Keyed by provider key
    accounts: DashMap<String, Account>,
    /// Internal account id -> provider key
    account_keys: DashMap<String, String>,
    /// Keyed by handle digest
    sessions: DashMap<String, Session>,
    calculations: DashMap<String, CalculationRecord>,
}

/// Process-local database.
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<Tables>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Account Operations ──────────────────────────────────────

    pub fn upsert_account(&self, candidate: &Account) -> (Account, bool) {
        match self.tables.accounts.entry(candidate.provider_key()) {
            Entry::Occupied(mut entry) => {
                let account = entry.get_mut();
                account.email = candidate.email.clone();
                account.display_name = candidate.display_name.clone();
                account.picture_url = candidate.picture_url.clone();
                account.last_login_at = candidate.last_login_at;
                (account.clone(), false)
            }
            Entry::Vacant(entry) => {
                self.tables
                    .account_keys
                    .insert(candidate.id.clone(), entry.key().clone());
                entry.insert(candidate.clone());
                (candidate.clone(), true)
            }
        }
    }

    pub fn get_account(&self, account_id: &str) -> Option<Account> {
        let key = self.tables.account_keys.get(account_id)?.value().clone();
        self.tables.accounts.get(&key).map(|a| a.value().clone())
    }

    pub fn set_preferences(&self, account_id: &str, preferences: &UserPreferences) -> bool {
        let Some(key) = self
            .tables
            .account_keys
            .get(account_id)
            .map(|k| k.value().clone())
        else {
            return false;
        };

        match self.tables.accounts.get_mut(&key) {
            Some(mut account) => {
                account.preferences = preferences.clone();
                true
            }
            None => false,
        }
    }

    // ─── Session Operations ──────────────────────────────────────

    pub fn insert_session(&self, session: &Session) -> bool {
        match self.tables.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(session.clone());
                true
            }
        }
    }

    pub fn lookup_session(&self, session_id: &str, now: DateTime<Utc>) -> SessionLookup {
        if self
            .tables
            .sessions
            .remove_if(session_id, |_, s| s.is_expired(now))
            .is_some()
        {
            return SessionLookup::Expired;
        }

        match self.tables.sessions.get(session_id) {
            Some(session) => SessionLookup::Active(session.value().clone()),
            None => SessionLookup::Missing,
        }
    }

    pub fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> SessionLookup {
        if self
            .tables
            .sessions
            .remove_if(session_id, |_, s| s.is_expired(now))
            .is_some()
        {
            return SessionLookup::Expired;
        }

        match self.tables.sessions.get_mut(session_id) {
            Some(mut session) => {
                // Re-check under the write lock; expiry may have passed in between.
                if session.is_expired(now) {
                    drop(session);
                    self.tables
                        .sessions
                        .remove_if(session_id, |_, s| s.is_expired(now));
                    return SessionLookup::Expired;
                }
                session.renew(now);
                SessionLookup::Active(session.value().clone())
            }
            None => SessionLookup::Missing,
        }
    }

    pub fn delete_session(&self, session_id: &str) {
        self.tables.sessions.remove(session_id);
    }

    pub fn sweep_sessions(&self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        self.tables.sessions.retain(|_, session| {
            let keep = session.expires_at >= now;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    // ─── Calculation Operations ──────────────────────────────────

    pub fn insert_calculation(&self, record: &CalculationRecord) {
        self.tables
            .calculations
            .insert(record.id.clone(), record.clone());
    }

    pub fn get_calculation(&self, account_id: &str, calculation_id: &str) -> Option<CalculationRecord> {
        self.tables
            .calculations
            .get(calculation_id)
            .filter(|r| r.account_id == account_id)
            .map(|r| r.value().clone())
    }

    pub fn list_calculations(
        &self,
        account_id: &str,
        query: CalculationQuery,
    ) -> Vec<CalculationRecord> {
        let mut records: Vec<CalculationRecord> = self
            .tables
            .calculations
            .iter()
            .filter(|r| r.account_id == account_id)
            .filter(|r| !query.favorites_only || r.is_favorite)
            .map(|r| r.value().clone())
            .collect();

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        records
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect()
    }

    pub fn set_favorite(
        &self,
        account_id: &str,
        calculation_id: &str,
        is_favorite: bool,
    ) -> Option<CalculationRecord> {
        let mut record = self
            .tables
            .calculations
            .get_mut(calculation_id)
            .filter(|r| r.account_id == account_id)?;
        record.is_favorite = is_favorite;
        Some(record.value().clone())
    }

    pub fn set_notes(
        &self,
        account_id: &str,
        calculation_id: &str,
        notes: Option<String>,
    ) -> Option<CalculationRecord> {
        let mut record = self
            .tables
            .calculations
            .get_mut(calculation_id)
            .filter(|r| r.account_id == account_id)?;
        record.notes = notes;
        Some(record.value().clone())
    }

    pub fn delete_calculation(&self, account_id: &str, calculation_id: &str) -> bool {
        self.tables
            .calculations
            .remove_if(calculation_id, |_, r| r.account_id == account_id)
            .is_some()
    }

    pub fn calculation_stats(&self, account_id: &str) -> CalculationStats {
        let mut stats = CalculationStats::default();
        for record in self.tables.calculations.iter() {
            if record.account_id == account_id {
                stats.update_from_record(record.value());
            }
        }
        stats
    }
}
