// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session stored in Firestore.
///
/// The document ID is the SHA-256 digest of the handle given to the browser;
/// the handle itself is never persisted and carries no claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Hex SHA-256 of the session handle (also the document ID)
    pub id: String,
    /// Owning account (fixed for the session's lifetime)
    pub account_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_touched_at: DateTime<Utc>,
    /// TTL this session renews by (default or "remember me")
    pub ttl_secs: u64,
}

impl Session {
    /// A session is expired once `now` is strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Renewal TTL; saturates at `TimeDelta::MAX` for out-of-range values.
    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }

    /// Extend expiry to `now + ttl`; never moves `expires_at` backwards.
    ///
    /// An expiry past the representable range clamps to `DateTime::MAX_UTC`.
    pub fn renew(&mut self, now: DateTime<Utc>) {
        let until = now
            .checked_add_signed(self.ttl())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.expires_at = self.expires_at.max(until);
        self.last_touched_at = now;
    }
}
