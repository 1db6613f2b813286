// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side session lifecycle: issue, validate, touch, revoke, sweep.
//!
//! The browser only ever holds an opaque, unguessable handle. The store keys
//! sessions by the SHA-256 digest of that handle, so a leaked database does
//! not yield usable handles.

use crate::db::{Database, SessionLookup};
use crate::error::AppError;
use crate::models::Session;
use crate::time_utils::{Clock, SystemClock};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Handle entropy in bytes (256 bits).
const HANDLE_BYTES: usize = 32;

/// Longest TTL configuration accepts for either session kind (one year).
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Attempts at drawing a fresh handle before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// When validated sessions get their expiry pushed out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenewalPolicy {
    /// Renew on every authenticated request.
    EveryRequest,
    /// Renew once remaining lifetime drops below this fraction of the TTL.
    WhenRemainingBelow(f64),
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self::WhenRemainingBelow(0.5)
    }
}

impl FromStr for RenewalPolicy {
    type Err = String;

    /// Accepts `always`, or a fraction in `(0, 1)`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("always") {
            return Ok(Self::EveryRequest);
        }

        let fraction: f64 = raw
            .parse()
            .map_err(|_| format!("expected 'always' or a fraction, got '{raw}'"))?;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(format!("renewal fraction must be in (0, 1), got {fraction}"));
        }
        Ok(Self::WhenRemainingBelow(fraction))
    }
}

/// Lifetimes and renewal behavior for new sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPolicy {
    pub ttl: Duration,
    /// TTL used when the user asked to be remembered
    pub remember_ttl: Duration,
    pub renewal: RenewalPolicy,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            remember_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            renewal: RenewalPolicy::default(),
        }
    }
}

/// Why a handle did not resolve to a live session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound | SessionError::Expired => AppError::Unauthenticated,
            SessionError::Store(e) => e,
        }
    }
}

/// A newly created session together with the handle to give the client.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub handle: String,
    pub session: Session,
}

/// Issues and resolves session handles against the store.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl SessionManager {
    pub fn new(db: Database, policy: SessionPolicy) -> Self {
        Self::with_clock(db, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, policy: SessionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            policy,
            clock,
            rng: SystemRandom::new(),
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Create a session for `account_id` and return its handle.
    pub async fn issue(&self, account_id: &str, remember: bool) -> Result<IssuedSession, AppError> {
        let ttl = if remember {
            self.policy.remember_ttl
        } else {
            self.policy.ttl
        };
        let ttl_delta = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("session TTL out of range: {e}")))?;

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let handle = self.generate_handle()?;
            let now = self.clock.now();
            let session = Session {
                id: digest(&handle),
                account_id: account_id.to_string(),
                issued_at: now,
                expires_at: now.checked_add_signed(ttl_delta).ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("session expiry out of range"))
                })?,
                last_touched_at: now,
                ttl_secs: ttl.as_secs(),
            };

            if self.db.insert_session(&session).await? {
                tracing::info!(
                    account_id,
                    remember,
                    expires_at = %session.expires_at,
                    "Session issued"
                );
                return Ok(IssuedSession { handle, session });
            }

            tracing::warn!("Session digest collision; drawing a new handle");
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "could not allocate a unique session handle"
        )))
    }

    /// Resolve a handle to its live session.
    ///
    /// An expired session is destroyed here, so the handle stays unusable
    /// even if the clock were to move backwards.
    pub async fn validate(&self, handle: &str) -> Result<Session, SessionError> {
        if handle.is_empty() {
            return Err(SessionError::NotFound);
        }

        let lookup = self.db.lookup_session(&digest(handle), self.clock.now()).await?;
        into_session(lookup)
    }

    /// Extend the session's expiry to `now + ttl`. Never shortens it.
    pub async fn touch(&self, handle: &str) -> Result<Session, SessionError> {
        if handle.is_empty() {
            return Err(SessionError::NotFound);
        }

        let lookup = self.db.touch_session(&digest(handle), self.clock.now()).await?;
        into_session(lookup)
    }

    /// Apply the renewal policy to a session that just validated.
    ///
    /// Returns the renewed session when the expiry moved, `None` otherwise.
    pub async fn maybe_renew(
        &self,
        handle: &str,
        session: &Session,
    ) -> Result<Option<Session>, SessionError> {
        let due = match self.policy.renewal {
            RenewalPolicy::EveryRequest => true,
            RenewalPolicy::WhenRemainingBelow(fraction) => {
                let remaining = session.remaining(self.clock.now());
                let threshold = session.ttl().num_milliseconds() as f64 * fraction;
                (remaining.num_milliseconds() as f64) < threshold
            }
        };

        if !due {
            return Ok(None);
        }

        let renewed = self.touch(handle).await?;
        tracing::debug!(
            account_id = %renewed.account_id,
            expires_at = %renewed.expires_at,
            "Session renewed"
        );
        Ok(Some(renewed))
    }

    /// Destroy the session behind `handle`. Unknown handles are not an error.
    pub async fn revoke(&self, handle: &str) -> Result<(), AppError> {
        if handle.is_empty() {
            return Ok(());
        }
        self.db.delete_session(&digest(handle)).await
    }

    /// Purge every stored session that has expired.
    pub async fn sweep(&self) -> Result<usize, AppError> {
        let purged = self.db.sweep_sessions(self.clock.now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Expired sessions purged");
        }
        Ok(purged)
    }

    fn generate_handle(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; HANDLE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Storage key for a handle: lowercase hex SHA-256.
pub fn digest(handle: &str) -> String {
    hex::encode(Sha256::digest(handle.as_bytes()))
}

fn into_session(lookup: SessionLookup) -> Result<Session, SessionError> {
    match lookup {
        SessionLookup::Active(session) => Ok(session),
        SessionLookup::Expired => {
            tracing::debug!("Rejected expired session");
            Err(SessionError::Expired)
        }
        SessionLookup::Missing => {
            tracing::debug!("Rejected unknown session handle");
            Err(SessionError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::ManualClock;
    use chrono::{TimeZone, Utc};

    fn manager(policy: SessionPolicy) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let db = Database::in_memory(Duration::from_secs(5));
        (SessionManager::with_clock(db, policy, clock.clone()), clock)
    }

    fn one_second() -> SessionPolicy {
        SessionPolicy {
            ttl: Duration::from_secs(1),
            remember_ttl: Duration::from_secs(10),
            renewal: RenewalPolicy::EveryRequest,
        }
    }

    #[test]
    fn handles_are_url_safe_and_distinct() {
        let (sessions, _) = manager(SessionPolicy::default());
        let a = sessions.generate_handle().unwrap();
        let b = sessions.generate_handle().unwrap();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn issue_with_unrepresentable_ttl_is_an_error() {
        let (sessions, _) = manager(SessionPolicy {
            ttl: Duration::from_secs(10_000_000_000_000),
            ..SessionPolicy::default()
        });

        let err = sessions.issue("acc-1", false).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn digest_is_stable_hex() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_eq!(digest("abc").len(), 64);
        assert_ne!(digest("abc"), digest("abd"));
    }

    #[test]
    fn renewal_policy_parses() {
        assert_eq!(
            "always".parse::<RenewalPolicy>().unwrap(),
            RenewalPolicy::EveryRequest
        );
        assert_eq!(
            "0.25".parse::<RenewalPolicy>().unwrap(),
            RenewalPolicy::WhenRemainingBelow(0.25)
        );
        assert!("0".parse::<RenewalPolicy>().is_err());
        assert!("1.0".parse::<RenewalPolicy>().is_err());
        assert!("1.5".parse::<RenewalPolicy>().is_err());
        assert!("sometimes".parse::<RenewalPolicy>().is_err());
    }

    #[tokio::test]
    async fn session_expires_after_ttl_and_stays_dead() {
        let (sessions, clock) = manager(one_second());
        let issued = sessions.issue("acc-1", false).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(500));
        let live = sessions.validate(&issued.handle).await.unwrap();
        assert_eq!(live.account_id, "acc-1");

        clock.advance(chrono::Duration::milliseconds(1000));
        assert!(matches!(
            sessions.validate(&issued.handle).await,
            Err(SessionError::Expired)
        ));

        // Winding the clock back must not resurrect the session.
        clock.advance(chrono::Duration::milliseconds(-1400));
        assert!(matches!(
            sessions.validate(&issued.handle).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn touch_extends_lifetime() {
        let (sessions, clock) = manager(one_second());
        let issued = sessions.issue("acc-1", false).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(800));
        sessions.touch(&issued.handle).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(800));
        assert!(sessions.validate(&issued.handle).await.is_ok());
    }

    #[tokio::test]
    async fn remember_me_uses_longer_ttl() {
        let (sessions, clock) = manager(one_second());
        let issued = sessions.issue("acc-1", true).await.unwrap();
        assert_eq!(issued.session.ttl_secs, 10);

        clock.advance(chrono::Duration::seconds(5));
        assert!(sessions.validate(&issued.handle).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (sessions, _) = manager(SessionPolicy::default());
        let issued = sessions.issue("acc-1", false).await.unwrap();

        sessions.revoke(&issued.handle).await.unwrap();
        sessions.revoke(&issued.handle).await.unwrap();
        assert!(matches!(
            sessions.validate(&issued.handle).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_and_empty_handles_are_not_found() {
        let (sessions, _) = manager(SessionPolicy::default());
        assert!(matches!(
            sessions.validate("nope").await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            sessions.validate("").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn sweep_purges_only_expired_sessions() {
        let (sessions, clock) = manager(one_second());
        let stale = sessions.issue("acc-1", false).await.unwrap();
        let kept = sessions.issue("acc-2", false).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(900));
        sessions.touch(&kept.handle).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(300));
        assert_eq!(sessions.sweep().await.unwrap(), 1);
        assert!(sessions.validate(&kept.handle).await.is_ok());
        assert!(matches!(
            sessions.validate(&stale.handle).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn renewal_waits_until_half_the_ttl_is_used() {
        let policy = SessionPolicy {
            ttl: Duration::from_secs(100),
            remember_ttl: Duration::from_secs(100),
            renewal: RenewalPolicy::WhenRemainingBelow(0.5),
        };
        let (sessions, clock) = manager(policy);
        let issued = sessions.issue("acc-1", false).await.unwrap();

        clock.advance(chrono::Duration::seconds(10));
        let session = sessions.validate(&issued.handle).await.unwrap();
        assert!(sessions
            .maybe_renew(&issued.handle, &session)
            .await
            .unwrap()
            .is_none());

        clock.advance(chrono::Duration::seconds(50));
        let session = sessions.validate(&issued.handle).await.unwrap();
        let renewed = sessions
            .maybe_renew(&issued.handle, &session)
            .await
            .unwrap()
            .expect("renewal due");
        assert_eq!(renewed.expires_at, clock.now() + chrono::Duration::seconds(100));
    }

    #[test]
    fn session_errors_collapse_to_unauthenticated() {
        assert!(matches!(
            AppError::from(SessionError::Expired),
            AppError::Unauthenticated
        ));
        assert!(matches!(
            AppError::from(SessionError::NotFound),
            AppError::Unauthenticated
        ));
        assert!(matches!(
            AppError::from(SessionError::Store(AppError::Transient("x".into()))),
            AppError::Transient(_)
        ));
    }
}
