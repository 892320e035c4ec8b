use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{File, FileMetadata};

/// File and folder operations against one tenant's hierarchy.
///
/// Every backend implements the same contract: version tokens change on
/// every successful mutation, non-folder names are returned without the
/// note suffix, and recursive listings are scoped to the tenant's base folder.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// List direct children of a folder. An empty `folder_id` targets the
    /// base folder, then the root.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileMetadata>, StorageError>;

    /// Get a file's metadata and content.
    async fn get_file(&self, file_id: &str) -> Result<File, StorageError>;

    /// Overwrite a file's content.
    ///
    /// A non-empty `etag` must match the stored version or the call fails with
    /// `PreconditionFailed` and leaves content untouched. An empty `etag`
    /// forces the write.
    async fn save_file(
        &self,
        file_id: &str,
        content: &[u8],
        etag: &str,
    ) -> Result<FileMetadata, StorageError>;

    /// Create a note in `folder_id` (base folder, then root, when empty).
    async fn create_file(
        &self,
        name: &str,
        content: &[u8],
        folder_id: &str,
    ) -> Result<FileMetadata, StorageError>;

    /// Create a folder under `parents` (base folder, then root, when empty).
    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<FileMetadata, StorageError>;

    /// Delete an item; folders take every transitive descendant with them.
    async fn delete_file(&self, file_id: &str) -> Result<(), StorageError>;

    /// Copy an item to a new ID named "Copy of <name>".
    async fn duplicate_file(&self, file_id: &str) -> Result<FileMetadata, StorageError>;

    async fn rename_file(&self, file_id: &str, new_name: &str)
        -> Result<FileMetadata, StorageError>;

    async fn set_starred(&self, file_id: &str, starred: bool)
        -> Result<FileMetadata, StorageError>;

    /// Starred items reachable from the base folder.
    async fn list_starred(&self) -> Result<Vec<FileMetadata>, StorageError>;

    /// Notes reachable from the base folder whose name or content contains
    /// `query` (case-insensitive). Folders never match.
    async fn search_files(&self, query: &str) -> Result<Vec<FileMetadata>, StorageError>;

    /// Folders literally at the top of the hierarchy, ignoring the base folder.
    async fn list_root_folders(&self) -> Result<Vec<FileMetadata>, StorageError>;

    /// Get or create a top-level folder named `name` and return its ID.
    async fn ensure_root_folder(&self, name: &str) -> Result<String, StorageError>;
}

/// Resolves the adapter serving a tenant.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn get_adapter(&self, tenant_id: &str) -> Result<Arc<dyn StorageAdapter>, StorageError>;
}

/// Per-tenant settings owned by the authentication layer.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// The folder the tenant designated as the application's working root.
    async fn base_folder_id(&self, tenant_id: &str) -> Result<Option<String>, StorageError>;

    /// A bearer token for the tenant's remote drive.
    async fn access_token(&self, tenant_id: &str) -> Result<String, StorageError>;
}
