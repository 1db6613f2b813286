// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Maps a verified external identity to exactly one internal account.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Account, UserPreferences, VerifiedIdentity};
use crate::time_utils::{Clock, SystemClock};
use std::sync::Arc;

/// Find-or-create for accounts keyed by `(provider, provider_user_id)`.
#[derive(Clone)]
pub struct AccountResolver {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl AccountResolver {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Resolve `identity` to its account, creating it on first sight.
    ///
    /// An existing account gets its profile fields refreshed; its id,
    /// creation time and preferences are left alone. Concurrent first
    /// sign-ins for the same identity converge on one account.
    pub async fn resolve(&self, identity: &VerifiedIdentity) -> Result<Account, AppError> {
        let now = self.clock.now();
        let candidate = Account {
            id: uuid::Uuid::new_v4().to_string(),
            provider: identity.provider.clone(),
            provider_user_id: identity.provider_user_id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            picture_url: identity.picture_url.clone(),
            created_at: now,
            last_login_at: now,
            preferences: UserPreferences::default(),
        };

        let (account, created) = self.db.upsert_account(&candidate).await?;

        if created {
            tracing::info!(
                account_id = %account.id,
                provider = %account.provider,
                "Created account"
            );
        } else {
            tracing::debug!(account_id = %account.id, "Refreshed account profile");
        }

        Ok(account)
    }
}
