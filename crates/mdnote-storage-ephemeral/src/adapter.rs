//! Ephemeral `StorageAdapter`: self-versioned, quota-bounded, expiring.
//!
//! Each tenant's records are loaded from an `ItemStore` and filtered in
//! process. Records whose sliding expiry has passed are treated as absent
//! whether or not the store has evicted them yet, so the process-local and
//! KV-backed modes answer identically.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use mdnote_storage_core::{
    resolve_target_folder, to_storage_name, AncestryWalker, File, FileMetadata, StorageAdapter,
    StorageError, FOLDER_MIME_TYPE, NOTE_MIME_TYPE, ROOT_FOLDER_ID,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::store::{FileRecord, ItemStore};

pub const DEFAULT_MAX_CONTENT_BYTES: usize = 256 * 1024;
pub const DEFAULT_MAX_NAME_LEN: usize = 255;
pub const DEFAULT_MAX_ITEMS: usize = 50;

/// Sliding lifetime of ephemeral data, refreshed by every write.
pub const DEFAULT_ITEM_TTL_SECS: i64 = 3600;

/// Per-tenant limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotas {
    pub max_content_bytes: usize,
    pub max_name_len: usize,
    pub max_items: usize,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl Quotas {
    fn check_name(&self, name: &str) -> Result<(), StorageError> {
        let len = name.chars().count();
        if len > self.max_name_len {
            return Err(StorageError::NameTooLong {
                len,
                max: self.max_name_len,
            });
        }
        Ok(())
    }

    fn check_content(&self, content: &[u8]) -> Result<(), StorageError> {
        if content.len() > self.max_content_bytes {
            return Err(StorageError::ContentTooLarge {
                size: content.len(),
                max: self.max_content_bytes,
            });
        }
        Ok(())
    }

    fn check_item_count(&self, current: usize) -> Result<(), StorageError> {
        if current >= self.max_items {
            return Err(StorageError::ItemLimitReached {
                max: self.max_items,
            });
        }
        Ok(())
    }
}

fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Ephemeral tier adapter for one tenant.
pub struct EphemeralAdapter {
    tenant_id: String,
    store: Arc<dyn ItemStore>,
    quotas: Quotas,
    ttl: Duration,
    base_folder_id: RwLock<Option<String>>,
    /// Serialises logical operations on this tenant.
    op_lock: Mutex<()>,
}

impl EphemeralAdapter {
    pub fn new(tenant_id: impl Into<String>, store: Arc<dyn ItemStore>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            store,
            quotas: Quotas::default(),
            ttl: Duration::seconds(DEFAULT_ITEM_TTL_SECS),
            base_folder_id: RwLock::new(None),
            op_lock: Mutex::new(()),
        }
    }

    pub fn with_quotas(mut self, quotas: Quotas) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn quotas(&self) -> Quotas {
        self.quotas
    }

    pub fn base_folder_id(&self) -> Option<String> {
        self.base_folder_id
            .read()
            .expect("base folder lock poisoned")
            .clone()
    }

    pub fn set_base_folder_id(&self, base_folder_id: Option<String>) {
        *self.base_folder_id.write().expect("base folder lock poisoned") =
            base_folder_id.filter(|id| !id.is_empty());
    }

    fn target_folder(&self, folder_id: &str) -> String {
        resolve_target_folder(folder_id, self.base_folder_id().as_deref())
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    async fn live_records(&self) -> Result<Vec<FileRecord>, StorageError> {
        let now = Self::now();
        let mut records = self.store.scan(&self.tenant_id).await?;
        records.retain(|r| !r.is_expired(now));
        Ok(records)
    }

    async fn load(&self, file_id: &str) -> Result<FileRecord, StorageError> {
        let now = Self::now();
        self.store
            .get(&self.tenant_id, file_id)
            .await?
            .filter(|r| !r.is_expired(now))
            .ok_or_else(|| StorageError::NotFound(format!("File {} not found", file_id)))
    }

    /// Stamp a fresh version and expiry, then persist.
    async fn commit(&self, mut record: FileRecord) -> Result<FileMetadata, StorageError> {
        let now = Utc::now();
        record.modified_time = now;
        record.etag = new_etag();
        record.expires_at = now.timestamp() + self.ttl.num_seconds();
        self.store.put(&record, self.ttl.num_seconds()).await?;
        Ok(record.to_metadata())
    }

    async fn check_capacity(&self) -> Result<(), StorageError> {
        let count = self.live_records().await?.len();
        self.quotas.check_item_count(count)
    }

    fn new_record(
        &self,
        name: String,
        mime_type: &str,
        parents: Vec<String>,
        content: Vec<u8>,
    ) -> FileRecord {
        FileRecord {
            tenant_id: self.tenant_id.clone(),
            id: Uuid::new_v4().to_string(),
            name,
            mime_type: mime_type.to_string(),
            modified_time: Utc::now(),
            size: content.len() as u64,
            etag: String::new(),
            parents,
            starred: false,
            content,
            expires_at: 0,
        }
    }

    /// Live records below the base folder that satisfy `keep`.
    async fn scoped<F>(&self, keep: F) -> Result<Vec<FileMetadata>, StorageError>
    where
        F: Fn(&FileRecord) -> bool,
    {
        let records = self.live_records().await?;
        let parent_map: HashMap<String, Vec<String>> = records
            .iter()
            .map(|r| (r.id.clone(), r.parents.clone()))
            .collect();
        let mut walker = AncestryWalker::new(&parent_map, self.target_folder(""));

        let mut result = Vec::new();
        for record in records.iter().filter(|r| keep(r)) {
            if walker.is_descendant(&record.parents).await {
                result.push(record.to_metadata());
            }
        }
        Ok(result)
    }

    /// Delete `file_id` and everything below it.
    ///
    /// The operation lock is released around each recursive call, so the
    /// subtree delete is not atomic: concurrent readers may observe it
    /// partially removed.
    fn delete_tree<'a>(
        &'a self,
        file_id: String,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            if !visited.insert(file_id.clone()) {
                return Ok(());
            }

            let children: Vec<String> = {
                let _guard = self.op_lock.lock().await;
                let record = self.load(&file_id).await?;
                if record.is_folder() {
                    self.live_records()
                        .await?
                        .into_iter()
                        .filter(|r| r.parents.iter().any(|p| p == &file_id))
                        .map(|r| r.id)
                        .collect()
                } else {
                    Vec::new()
                }
            };

            for child in children {
                match self.delete_tree(child, visited).await {
                    // Removed concurrently.
                    Err(StorageError::NotFound(_)) => {}
                    other => other?,
                }
            }

            let _guard = self.op_lock.lock().await;
            self.store.delete(&self.tenant_id, &file_id).await?;
            debug!("Deleted {} for tenant {}", file_id, self.tenant_id);
            Ok(())
        })
    }
}

#[async_trait]
impl StorageAdapter for EphemeralAdapter {
    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileMetadata>, StorageError> {
        let _guard = self.op_lock.lock().await;
        let target = self.target_folder(folder_id);
        let files: Vec<_> = self
            .live_records()
            .await?
            .iter()
            .map(FileRecord::to_metadata)
            .filter(|m| m.is_child_of(&target))
            .collect();
        debug!("Listed {} items in folder {}", files.len(), target);
        Ok(files)
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn get_file(&self, file_id: &str) -> Result<File, StorageError> {
        let _guard = self.op_lock.lock().await;
        let record = self.load(file_id).await?;
        Ok(File {
            metadata: record.to_metadata(),
            content: record.content,
        })
    }

    #[instrument(skip(self, content), level = "debug", fields(tenant = %self.tenant_id, data_len = content.len()))]
    async fn save_file(
        &self,
        file_id: &str,
        content: &[u8],
        etag: &str,
    ) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        let mut record = self.load(file_id).await?;
        if record.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "{} is a folder and has no content",
                file_id
            )));
        }
        if !etag.is_empty() && etag != record.etag {
            return Err(StorageError::PreconditionFailed(format!(
                "{} is at version {}, caller had {}",
                file_id, record.etag, etag
            )));
        }
        self.quotas.check_content(content)?;

        record.content = content.to_vec();
        record.size = content.len() as u64;
        self.commit(record).await
    }

    #[instrument(skip(self, content), level = "debug", fields(tenant = %self.tenant_id, data_len = content.len()))]
    async fn create_file(
        &self,
        name: &str,
        content: &[u8],
        folder_id: &str,
    ) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        self.quotas.check_name(name)?;
        self.quotas.check_content(content)?;
        self.check_capacity().await?;

        let record = self.new_record(
            to_storage_name(name),
            NOTE_MIME_TYPE,
            vec![self.target_folder(folder_id)],
            content.to_vec(),
        );
        self.commit(record).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        self.quotas.check_name(name)?;
        self.check_capacity().await?;

        let parents = if parents.is_empty() {
            vec![self.target_folder("")]
        } else {
            parents.to_vec()
        };
        let record = self.new_record(name.to_string(), FOLDER_MIME_TYPE, parents, Vec::new());
        self.commit(record).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn delete_file(&self, file_id: &str) -> Result<(), StorageError> {
        let mut visited = HashSet::new();
        self.delete_tree(file_id.to_string(), &mut visited).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn duplicate_file(&self, file_id: &str) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        let original = self.load(file_id).await?;
        if original.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "Cannot duplicate folder {}",
                file_id
            )));
        }
        self.check_capacity().await?;

        let copy = self.new_record(
            to_storage_name(&format!("Copy of {}", original.display_name())),
            &original.mime_type,
            original.parents.clone(),
            original.content.clone(),
        );
        self.commit(copy).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn rename_file(
        &self,
        file_id: &str,
        new_name: &str,
    ) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        self.quotas.check_name(new_name)?;
        let mut record = self.load(file_id).await?;
        record.name = if record.is_folder() {
            new_name.to_string()
        } else {
            to_storage_name(new_name)
        };
        self.commit(record).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn set_starred(
        &self,
        file_id: &str,
        starred: bool,
    ) -> Result<FileMetadata, StorageError> {
        let _guard = self.op_lock.lock().await;
        let mut record = self.load(file_id).await?;
        record.starred = starred;
        self.commit(record).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_starred(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let _guard = self.op_lock.lock().await;
        self.scoped(|r| r.starred).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn search_files(&self, query: &str) -> Result<Vec<FileMetadata>, StorageError> {
        let _guard = self.op_lock.lock().await;
        let needle = query.to_lowercase();
        self.scoped(|r| {
            !r.is_folder()
                && (r.display_name().to_lowercase().contains(&needle)
                    || String::from_utf8_lossy(&r.content)
                        .to_lowercase()
                        .contains(&needle))
        })
        .await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_root_folders(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let _guard = self.op_lock.lock().await;
        Ok(self
            .live_records()
            .await?
            .iter()
            .map(FileRecord::to_metadata)
            .filter(|m| m.is_folder() && m.is_top_level())
            .collect())
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn ensure_root_folder(&self, name: &str) -> Result<String, StorageError> {
        let _guard = self.op_lock.lock().await;
        self.quotas.check_name(name)?;

        let records = self.live_records().await?;
        if let Some(existing) = records
            .iter()
            .find(|r| r.is_folder() && r.name == name && r.to_metadata().is_top_level())
        {
            return Ok(existing.id.clone());
        }
        self.quotas.check_item_count(records.len())?;

        let record = self.new_record(
            name.to_string(),
            FOLDER_MIME_TYPE,
            vec![ROOT_FOLDER_ID.to_string()],
            Vec::new(),
        );
        let created = self.commit(record).await?;
        debug!("Created root folder {} as {}", name, created.id);
        Ok(created.id)
    }
}
