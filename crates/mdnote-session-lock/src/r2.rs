//! Lock manager over Cloudflare R2 (S3-compatible) with ETag-based CAS.
//!
//! Storage layout:
//! ```text
//! {bucket}/
//!   {prefix}{file_id}      # JSON EditingSession
//! ```
//!
//! Every transition reads the record with its ETag, decides with
//! `LockPolicy`, then writes with `If-Match` (or `If-None-Match: *` when
//! absent). A 412 means another writer got there first: the transition is
//! re-decided against the new record. Transport failures are never retried.

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Duration;
use mdnote_storage_core::{EditingSession, LockManager, LockPolicy, StorageError};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_LOCK_PREFIX: &str = "locks/";

/// Bound on re-decisions after losing a conditional write.
pub const CAS_MAX_ATTEMPTS: u32 = 10;

/// Stored lock record plus the ETag it was read at.
struct Versioned {
    session: EditingSession,
    etag: String,
}

pub struct R2LockManager {
    s3_client: S3Client,
    bucket_name: String,
    prefix: String,
    policy: LockPolicy,
}

impl R2LockManager {
    pub fn new(s3_client: S3Client, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
            prefix: DEFAULT_LOCK_PREFIX.to_string(),
            policy: LockPolicy::default(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.policy = LockPolicy::new(ttl);
        self
    }

    fn lock_key(&self, file_id: &str) -> String {
        format!("{}{}", self.prefix, file_id)
    }

    fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
        match err {
            SdkError::ServiceError(e) => Some(e.raw().status().as_u16()),
            SdkError::ResponseError(e) => Some(e.raw().status().as_u16()),
            _ => None,
        }
    }

    /// Read the lock record with its ETag. `None` if absent.
    async fn read(&self, key: &str) -> Result<Option<Versioned>, StorageError> {
        let result = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                if Self::status_of(&e) == Some(404) {
                    return Ok(None);
                }
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StorageError::Unavailable(format!(
                    "R2 get_object error: {}",
                    service_error
                )));
            }
        };

        let etag = output.e_tag().unwrap_or("").to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("Failed to read R2 object body: {}", e))
            })?
            .into_bytes();
        let session: EditingSession = serde_json::from_slice(&bytes)?;
        Ok(Some(Versioned { session, etag }))
    }

    /// Conditionally write a lock record. Returns `false` on 412.
    async fn write(
        &self,
        key: &str,
        session: &EditingSession,
        expected_etag: Option<&str>,
    ) -> Result<bool, StorageError> {
        let body = serde_json::to_vec(session)?;
        let mut req = self
            .s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body));

        req = match expected_etag {
            Some(etag) => req.if_match(etag),
            None => req.if_none_match("*"),
        };

        match req.send().await {
            Ok(_) => Ok(true),
            Err(e) if Self::status_of(&e) == Some(412) => Ok(false),
            Err(e) => Err(StorageError::Unavailable(format!(
                "R2 put_object error: {}",
                e
            ))),
        }
    }

    /// Delete a lock record if it is still at `etag`. Returns `false` on 412.
    async fn remove(&self, key: &str, etag: &str) -> Result<bool, StorageError> {
        let result = self
            .s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .if_match(etag)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if Self::status_of(&e) == Some(412) => Ok(false),
            // Already gone: nothing left to release.
            Err(e) if Self::status_of(&e) == Some(404) => Ok(true),
            Err(e) => Err(StorageError::Unavailable(format!(
                "R2 delete_object error: {}",
                e
            ))),
        }
    }

    fn exhausted(file_id: &str) -> StorageError {
        StorageError::Unavailable(format!(
            "Lock on {} still contended after {} attempts",
            file_id, CAS_MAX_ATTEMPTS
        ))
    }
}

#[async_trait]
impl LockManager for R2LockManager {
    #[instrument(skip(self), level = "debug")]
    async fn acquire_lock(
        &self,
        file_id: &str,
        user_id: &str,
    ) -> Result<EditingSession, StorageError> {
        let key = self.lock_key(file_id);

        for attempt in 0..CAS_MAX_ATTEMPTS {
            let current = self.read(&key).await?;
            let session = self.policy.acquire(
                current.as_ref().map(|v| &v.session),
                file_id,
                user_id,
                LockPolicy::now(),
            )?;

            if self
                .write(&key, &session, current.as_ref().map(|v| v.etag.as_str()))
                .await?
            {
                info!(
                    attempt,
                    "Lock on {} held by {} until {}", file_id, user_id, session.expires_at
                );
                return Ok(session);
            }
            warn!(attempt, file_id, "Lock acquire lost a concurrent write (412), re-evaluating");
        }

        Err(Self::exhausted(file_id))
    }

    #[instrument(skip(self), level = "debug")]
    async fn heartbeat(
        &self,
        file_id: &str,
        user_id: &str,
    ) -> Result<EditingSession, StorageError> {
        let key = self.lock_key(file_id);

        for attempt in 0..CAS_MAX_ATTEMPTS {
            let current = self.read(&key).await?;
            let session = self.policy.heartbeat(
                current.as_ref().map(|v| &v.session),
                file_id,
                user_id,
                LockPolicy::now(),
            )?;

            // A successful decision implies a record was present.
            let etag = current.as_ref().map(|v| v.etag.as_str());
            if self.write(&key, &session, etag).await? {
                debug!(attempt, "Lock on {} extended to {}", file_id, session.expires_at);
                return Ok(session);
            }
            warn!(attempt, file_id, "Heartbeat lost a concurrent write (412), re-evaluating");
        }

        Err(Self::exhausted(file_id))
    }

    #[instrument(skip(self), level = "debug")]
    async fn release_lock(&self, file_id: &str, user_id: &str) -> Result<(), StorageError> {
        let key = self.lock_key(file_id);

        for attempt in 0..CAS_MAX_ATTEMPTS {
            let current = self.read(&key).await?;
            self.policy
                .release(current.as_ref().map(|v| &v.session), file_id, user_id)?;

            let etag = current.as_ref().map(|v| v.etag.as_str()).unwrap_or("*");
            if self.remove(&key, etag).await? {
                info!(attempt, "Lock on {} released by {}", file_id, user_id);
                return Ok(());
            }
            warn!(attempt, file_id, "Lock release lost a concurrent write (412), re-evaluating");
        }

        Err(Self::exhausted(file_id))
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_lock_status(
        &self,
        file_id: &str,
    ) -> Result<Option<EditingSession>, StorageError> {
        let current = self.read(&self.lock_key(file_id)).await?;
        Ok(self
            .policy
            .effective(current.map(|v| v.session), LockPolicy::now()))
    }
}
