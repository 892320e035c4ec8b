//! Session locks: one exclusive, TTL-bound editing claim per file.
//!
//! State per file is Unlocked or Locked(owner, expiry). Expiry is never
//! trusted to the backing store: the effective state is the stored record
//! re-evaluated against the current time on every read. `LockPolicy` holds
//! the transition rules so every `LockManager` implementation decides the
//! same way and only differs in how it makes the write atomic.

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Default lock lifetime. Comfortably longer than the heartbeat interval so
/// a few missed renewals do not drop the lock.
pub const DEFAULT_LOCK_TTL_SECS: i64 = 300;

/// Interval at which clients are expected to send heartbeats.
pub const HEARTBEAT_INTERVAL_SECS: i64 = 30;

/// An active editing claim on a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditingSession {
    pub file_id: String,
    /// Current holder
    pub user_id: String,
    /// Absolute expiry, Unix seconds
    pub expires_at: i64,
}

impl EditingSession {
    /// A lock is held through its expiry second.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Lock manager abstraction for coordinating concurrent edits.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Claim `file_id` for `user_id`.
    ///
    /// Succeeds when no record exists, the record has expired, or `user_id`
    /// already holds it (refresh). Otherwise fails with `LockConflict`
    /// carrying the current holder and expiry.
    async fn acquire_lock(
        &self,
        file_id: &str,
        user_id: &str,
    ) -> Result<EditingSession, StorageError>;

    /// Extend a lock `user_id` currently holds. Never re-acquires.
    async fn heartbeat(&self, file_id: &str, user_id: &str)
        -> Result<EditingSession, StorageError>;

    /// Drop a lock `user_id` holds.
    async fn release_lock(&self, file_id: &str, user_id: &str) -> Result<(), StorageError>;

    /// The effective lock, or `None` when absent or expired.
    async fn get_lock_status(&self, file_id: &str)
        -> Result<Option<EditingSession>, StorageError>;
}

/// Transition rules shared by every lock manager.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    ttl: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_LOCK_TTL_SECS))
    }
}

impl LockPolicy {
    /// A negative TTL produces locks that are already expired when written.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn fresh_expiry(&self, now: i64) -> i64 {
        now + self.ttl.num_seconds()
    }

    /// Effective state of a stored record at `now`.
    pub fn effective(&self, stored: Option<EditingSession>, now: i64) -> Option<EditingSession> {
        stored.filter(|s| !s.is_expired(now))
    }

    /// Decide an acquire against the stored record.
    pub fn acquire(
        &self,
        stored: Option<&EditingSession>,
        file_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<EditingSession, StorageError> {
        let mut expires_at = self.fresh_expiry(now);
        if let Some(existing) = stored {
            if existing.user_id == user_id {
                // Refreshing never shortens an existing claim.
                expires_at = expires_at.max(existing.expires_at);
            } else if !existing.is_expired(now) {
                return Err(StorageError::LockConflict {
                    file_id: file_id.to_string(),
                    owner: existing.user_id.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }

        Ok(EditingSession {
            file_id: file_id.to_string(),
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    /// Decide a heartbeat against the stored record. The new expiry is
    /// strictly later than the stored one.
    pub fn heartbeat(
        &self,
        stored: Option<&EditingSession>,
        file_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<EditingSession, StorageError> {
        let existing = match stored {
            Some(existing) if !existing.is_expired(now) => existing,
            _ => {
                return Err(StorageError::LockNotHeld(format!(
                    "No active lock on {}",
                    file_id
                )))
            }
        };
        if existing.user_id != user_id {
            return Err(StorageError::LockNotHeld(format!(
                "Lock on {} is held by another user",
                file_id
            )));
        }

        Ok(EditingSession {
            file_id: file_id.to_string(),
            user_id: user_id.to_string(),
            expires_at: self.fresh_expiry(now).max(existing.expires_at + 1),
        })
    }

    /// Decide a release against the stored record.
    pub fn release(
        &self,
        stored: Option<&EditingSession>,
        file_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError> {
        match stored {
            Some(existing) if existing.user_id == user_id => Ok(()),
            Some(_) => Err(StorageError::LockNotHeld(format!(
                "Lock on {} is held by another user",
                file_id
            ))),
            None => Err(StorageError::LockNotHeld(format!(
                "No lock on {}",
                file_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn session(user: &str, expires_at: i64) -> EditingSession {
        EditingSession {
            file_id: "f".to_string(),
            user_id: user.to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_acquire_unlocked() {
        let policy = LockPolicy::default();
        let s = policy.acquire(None, "f", "alice", NOW).unwrap();
        assert_eq!(s.user_id, "alice");
        assert_eq!(s.expires_at, NOW + DEFAULT_LOCK_TTL_SECS);
    }

    #[test]
    fn test_acquire_held_by_other() {
        let policy = LockPolicy::default();
        let held = session("alice", NOW + 10);
        let err = policy.acquire(Some(&held), "f", "bob", NOW).unwrap_err();
        assert_eq!(
            err,
            StorageError::LockConflict {
                file_id: "f".to_string(),
                owner: "alice".to_string(),
                expires_at: NOW + 10,
            }
        );
    }

    #[test]
    fn test_acquire_held_through_expiry_second() {
        let policy = LockPolicy::default();
        let held = session("alice", NOW);
        assert!(policy.acquire(Some(&held), "f", "bob", NOW).is_err());
        assert!(policy.acquire(Some(&held), "f", "bob", NOW + 1).is_ok());
    }

    #[test]
    fn test_acquire_same_owner_never_shortens() {
        let policy = LockPolicy::new(Duration::seconds(10));
        let held = session("alice", NOW + 100);
        let s = policy.acquire(Some(&held), "f", "alice", NOW).unwrap();
        assert_eq!(s.expires_at, NOW + 100);
    }

    #[test]
    fn test_heartbeat_strictly_increases() {
        let policy = LockPolicy::default();
        let held = session("alice", NOW + DEFAULT_LOCK_TTL_SECS);
        let s = policy.heartbeat(Some(&held), "f", "alice", NOW).unwrap();
        assert!(s.expires_at > held.expires_at);
    }

    #[test]
    fn test_heartbeat_rejects_absent_expired_and_foreign() {
        let policy = LockPolicy::default();
        assert!(matches!(
            policy.heartbeat(None, "f", "alice", NOW),
            Err(StorageError::LockNotHeld(_))
        ));
        let expired = session("alice", NOW - 1);
        assert!(matches!(
            policy.heartbeat(Some(&expired), "f", "alice", NOW),
            Err(StorageError::LockNotHeld(_))
        ));
        let foreign = session("bob", NOW + 60);
        assert!(matches!(
            policy.heartbeat(Some(&foreign), "f", "alice", NOW),
            Err(StorageError::LockNotHeld(_))
        ));
    }

    #[test]
    fn test_release_rules() {
        let policy = LockPolicy::default();
        let held = session("alice", NOW + 60);
        assert!(policy.release(Some(&held), "f", "alice").is_ok());
        assert!(policy.release(Some(&held), "f", "bob").is_err());
        assert!(policy.release(None, "f", "alice").is_err());
    }

    #[test]
    fn test_effective_hides_expired() {
        let policy = LockPolicy::default();
        assert!(policy.effective(Some(session("a", NOW - 1)), NOW).is_none());
        assert!(policy.effective(Some(session("a", NOW)), NOW).is_some());
        assert!(policy.effective(None, NOW).is_none());
    }
}
