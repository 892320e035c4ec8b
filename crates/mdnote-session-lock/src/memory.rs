use async_trait::async_trait;
use chrono::Duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mdnote_storage_core::{EditingSession, LockManager, LockPolicy, StorageError};
use tracing::{debug, info, instrument};

/// Process-local lock manager.
///
/// Each decision runs while holding the map entry, so the read and the
/// conditional write are one atomic step per file. Expired records are
/// evicted when a status check or heartbeat comes across them.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    locks: DashMap<String, EditingSession>,
    policy: LockPolicy,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones not yet evicted included.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn evict_expired(&self, file_id: &str, now: i64) {
        if self
            .locks
            .remove_if(file_id, |_, stored| stored.is_expired(now))
            .is_some()
        {
            debug!("Evicted expired lock on {}", file_id);
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.policy = LockPolicy::new(ttl);
        self
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    #[instrument(skip(self), level = "debug")]
    async fn acquire_lock(
        &self,
        file_id: &str,
        user_id: &str,
    ) -> Result<EditingSession, StorageError> {
        let now = LockPolicy::now();
        let session = match self.locks.entry(file_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let session = self.policy.acquire(Some(entry.get()), file_id, user_id, now)?;
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => {
                let session = self.policy.acquire(None, file_id, user_id, now)?;
                entry.insert(session.clone());
                session
            }
        };
        info!("Lock on {} held by {} until {}", file_id, user_id, session.expires_at);
        Ok(session)
    }

    #[instrument(skip(self), level = "debug")]
    async fn heartbeat(
        &self,
        file_id: &str,
        user_id: &str,
    ) -> Result<EditingSession, StorageError> {
        let now = LockPolicy::now();
        self.evict_expired(file_id, now);
        match self.locks.get_mut(file_id) {
            Some(mut stored) => {
                let session = self.policy.heartbeat(Some(stored.value()), file_id, user_id, now)?;
                *stored = session.clone();
                debug!("Lock on {} extended to {}", file_id, session.expires_at);
                Ok(session)
            }
            None => self.policy.heartbeat(None, file_id, user_id, now),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn release_lock(&self, file_id: &str, user_id: &str) -> Result<(), StorageError> {
        match self.locks.entry(file_id.to_string()) {
            Entry::Occupied(entry) => {
                // The recorded owner may still release an expired lock.
                if let Err(e) = self.policy.release(Some(entry.get()), file_id, user_id) {
                    if entry.get().is_expired(LockPolicy::now()) {
                        entry.remove();
                    }
                    return Err(e);
                }
                entry.remove();
            }
            Entry::Vacant(_) => self.policy.release(None, file_id, user_id)?,
        }
        info!("Lock on {} released by {}", file_id, user_id);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_lock_status(
        &self,
        file_id: &str,
    ) -> Result<Option<EditingSession>, StorageError> {
        let now = LockPolicy::now();
        self.evict_expired(file_id, now);
        let stored = self.locks.get(file_id).map(|s| s.value().clone());
        Ok(self.policy.effective(stored, now))
    }
}
