//! Access-token lease shared by every gateway call.
//!
//! The broker issues one access token per login. It is written once by the
//! login flow and read by every order placement and stream open, always
//! through [`CredentialStore::current`] so validity is checked on each read.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::error::LeaseError;

/// Broker tokens are invalidated daily at 06:00 IST, which is 00:30 UTC.
const DAILY_RESET_UTC: (u32, u32) = (0, 30);

/// A credential with an explicit validity window.
pub struct AccessTokenLease {
    token: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessTokenLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenLease")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AccessTokenLease {
    #[must_use]
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            issued_at,
            expires_at,
        }
    }

    /// Lease that expires at the first daily broker reset after `issued_at`.
    #[must_use]
    pub fn until_daily_reset(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        let (hour, minute) = DAILY_RESET_UTC;
        let reset_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
        let mut expires_at = issued_at.date_naive().and_time(reset_time).and_utc();
        if expires_at <= issued_at {
            expires_at += Duration::days(1);
        }
        Self::new(token, issued_at, expires_at)
    }

    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// The raw token. Never log this.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Thread-safe holder of the current lease.
#[derive(Debug, Default)]
pub struct CredentialStore {
    lease: RwLock<Option<Arc<AccessTokenLease>>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current lease (called after a successful login).
    pub fn install(&self, lease: AccessTokenLease) {
        tracing::info!(expires_at = %lease.expires_at, "Access token lease installed");
        *self.lease.write() = Some(Arc::new(lease));
    }

    /// Drops the current lease.
    pub fn revoke(&self) {
        *self.lease.write() = None;
    }

    /// Returns the lease if one is installed and still valid at `now`.
    ///
    /// # Errors
    /// [`LeaseError::Missing`] before the first login, [`LeaseError::Expired`]
    /// once the window has passed.
    pub fn current_at(&self, now: DateTime<Utc>) -> Result<Arc<AccessTokenLease>, LeaseError> {
        let guard = self.lease.read();
        let lease = guard.as_ref().ok_or(LeaseError::Missing)?;
        if lease.is_valid(now) {
            Ok(Arc::clone(lease))
        } else {
            Err(LeaseError::Expired {
                expired_at: lease.expires_at,
            })
        }
    }

    /// [`Self::current_at`] with the wall clock.
    ///
    /// # Errors
    /// See [`Self::current_at`].
    pub fn current(&self) -> Result<Arc<AccessTokenLease>, LeaseError> {
        self.current_at(Utc::now())
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.current().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap()
    }

    #[test]
    fn lease_valid_strictly_before_expiry() {
        let lease = AccessTokenLease::new("tok", at(1, 0), at(2, 0));
        assert!(lease.is_valid(at(1, 59)));
        assert!(!lease.is_valid(at(2, 0)));
    }

    #[test]
    fn daily_reset_rolls_to_next_day_after_reset_time() {
        let lease = AccessTokenLease::until_daily_reset("tok", at(4, 0));
        assert_eq!(lease.expires_at(), Utc.with_ymd_and_hms(2024, 5, 11, 0, 30, 0).unwrap());
    }

    #[test]
    fn daily_reset_same_day_before_reset_time() {
        let lease = AccessTokenLease::until_daily_reset("tok", at(0, 10));
        assert_eq!(lease.expires_at(), at(0, 30));
    }

    #[test]
    fn store_reports_missing_then_valid_then_expired() {
        let store = CredentialStore::new();
        assert_eq!(store.current_at(at(1, 0)).unwrap_err(), LeaseError::Missing);

        store.install(AccessTokenLease::new("tok", at(1, 0), at(2, 0)));
        assert_eq!(store.current_at(at(1, 30)).unwrap().token(), "tok");

        assert!(matches!(
            store.current_at(at(3, 0)),
            Err(LeaseError::Expired { .. })
        ));
    }

    #[test]
    fn debug_output_hides_token() {
        let lease = AccessTokenLease::new("super-secret", at(1, 0), at(2, 0));
        assert!(!format!("{lease:?}").contains("super-secret"));
    }
}
