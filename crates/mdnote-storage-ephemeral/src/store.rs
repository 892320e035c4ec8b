//! Record storage behind the ephemeral adapter.
//!
//! A store only persists records keyed by `(tenant, id)`. Expiry, quotas and
//! hierarchy rules live in the adapter so that every store behaves the same.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mdnote_storage_core::{from_storage_name, FileMetadata, StorageError, FOLDER_MIME_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// One file or folder as persisted, content included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub tenant_id: String,
    pub id: String,
    /// Stored name; notes carry the reserved suffix
    pub name: String,
    pub mime_type: String,
    pub modified_time: DateTime<Utc>,
    pub size: u64,
    pub etag: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default, with = "content_base64")]
    pub content: Vec<u8>,
    /// Sliding expiry, Unix seconds
    pub expires_at: i64,
}

impl FileRecord {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }

    pub fn display_name(&self) -> String {
        if self.is_folder() {
            self.name.clone()
        } else {
            from_storage_name(&self.name)
        }
    }

    pub fn to_metadata(&self) -> FileMetadata {
        FileMetadata {
            id: self.id.clone(),
            name: self.display_name(),
            mime_type: self.mime_type.clone(),
            modified_time: self.modified_time,
            size: self.size,
            etag: self.etag.clone(),
            parents: self.parents.clone(),
            starred: self.starred,
        }
    }
}

mod content_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Persistence for ephemeral records.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Store name for logging.
    fn backend_name(&self) -> &'static str;

    /// Records stored for a tenant. Expired records may still be returned
    /// until the store evicts them.
    async fn scan(&self, tenant_id: &str) -> Result<Vec<FileRecord>, StorageError>;

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<FileRecord>, StorageError>;

    /// Insert or replace a record. `ttl_secs` lets the store evict it physically.
    async fn put(&self, record: &FileRecord, ttl_secs: i64) -> Result<(), StorageError>;

    /// Returns whether a record was removed.
    async fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError>;
}

/// Process-local store for isolated use and tests.
///
/// Expired records are evicted when a read comes across them.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    records: DashMap<(String, String), FileRecord>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan(&self, tenant_id: &str) -> Result<Vec<FileRecord>, StorageError> {
        let now = Utc::now().timestamp();
        let before = self.records.len();
        self.records
            .retain(|(tenant, _), record| tenant != tenant_id || !record.is_expired(now));
        let evicted = before.saturating_sub(self.records.len());

        let records: Vec<FileRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        debug!(
            "Scanned {} records for tenant {} ({} expired evicted)",
            records.len(),
            tenant_id,
            evicted
        );
        Ok(records)
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<FileRecord>, StorageError> {
        let key = (tenant_id.to_string(), id.to_string());
        let now = Utc::now().timestamp();
        self.records.remove_if(&key, |_, record| record.is_expired(now));
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }

    async fn put(&self, record: &FileRecord, _ttl_secs: i64) -> Result<(), StorageError> {
        self.records.insert(
            (record.tenant_id.clone(), record.id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .records
            .remove(&(tenant_id.to_string(), id.to_string()))
            .is_some())
    }
}
