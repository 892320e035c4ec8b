//! Google Drive `StorageAdapter` for one tenant.
//!
//! Drive gives us version numbers and parent links natively, but its list
//! queries are flat. Starred listings and search are therefore scoped to the
//! tenant's base folder client-side with an `AncestryWalker`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdnote_storage_core::{
    from_storage_name, resolve_target_folder, to_storage_name, AncestryWalker, File,
    FileMetadata, ParentLookup, StorageAdapter, StorageError, TenantDirectory, FOLDER_MIME_TYPE,
    NOTE_SUFFIX, ROOT_FOLDER_ID,
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::{escape_query_literal, DriveFile, GDriveClient};

/// Parent lookups against Drive for a single logical call.
struct DriveParents<'a> {
    client: &'a GDriveClient,
    token: &'a str,
}

#[async_trait]
impl<'a> ParentLookup for DriveParents<'a> {
    async fn parents_of(&self, id: &str) -> Result<Option<Vec<String>>, StorageError> {
        match self.client.get_parents(self.token, id).await {
            Ok(parents) => Ok(Some(parents)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Remote tier adapter backed by the Drive v3 API.
pub struct RemoteAdapter {
    tenant_id: String,
    client: Arc<GDriveClient>,
    directory: Arc<dyn TenantDirectory>,
    base_folder_id: RwLock<Option<String>>,
}

impl RemoteAdapter {
    pub fn new(
        tenant_id: impl Into<String>,
        client: Arc<GDriveClient>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client,
            directory,
            base_folder_id: RwLock::new(None),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn base_folder_id(&self) -> Option<String> {
        self.base_folder_id
            .read()
            .expect("base folder lock poisoned")
            .clone()
    }

    /// Point recursive listings at a new base folder.
    pub fn set_base_folder_id(&self, base_folder_id: Option<String>) {
        *self.base_folder_id.write().expect("base folder lock poisoned") =
            base_folder_id.filter(|id| !id.is_empty());
    }

    async fn token(&self) -> Result<String, StorageError> {
        self.directory.access_token(&self.tenant_id).await
    }

    fn target_folder(&self, folder_id: &str) -> String {
        resolve_target_folder(folder_id, self.base_folder_id().as_deref())
    }

    /// Keep only items that sit below the base folder.
    async fn scope_to_base(
        &self,
        token: &str,
        files: Vec<DriveFile>,
    ) -> Vec<FileMetadata> {
        let lookup = DriveParents {
            client: &self.client,
            token,
        };
        let mut walker = AncestryWalker::new(&lookup, self.target_folder(""));

        let mut scoped = Vec::new();
        for file in files {
            if walker.is_descendant(&file.parents).await {
                scoped.push(to_metadata(file));
            }
        }
        debug!(
            "Scoped {} items with {} ancestor lookups",
            scoped.len(),
            walker.lookups()
        );
        scoped
    }
}

/// Folders and notes are visible; anything else in the drive is not ours.
fn is_managed(file: &DriveFile) -> bool {
    file.is_folder() || file.name.ends_with(NOTE_SUFFIX)
}

fn to_metadata(file: DriveFile) -> FileMetadata {
    let is_folder = file.is_folder();
    let modified_time = file
        .modified_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();

    FileMetadata {
        name: if is_folder {
            file.name
        } else {
            from_storage_name(&file.name)
        },
        size: file
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0),
        etag: file.version.unwrap_or_default(),
        id: file.id,
        mime_type: file.mime_type,
        modified_time,
        parents: file.parents,
        starred: file.starred,
    }
}

#[async_trait]
impl StorageAdapter for RemoteAdapter {
    fn backend_name(&self) -> &'static str {
        "gdrive"
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_files(&self, folder_id: &str) -> Result<Vec<FileMetadata>, StorageError> {
        let token = self.token().await?;
        let target = self.target_folder(folder_id);
        let query = format!(
            "'{}' in parents and trashed = false",
            escape_query_literal(&target)
        );

        let files = self.client.list_files(&token, &query).await?;
        let result: Vec<_> = files
            .into_iter()
            .filter(is_managed)
            .map(to_metadata)
            .collect();

        debug!("Listed {} items in folder {}", result.len(), target);
        Ok(result)
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn get_file(&self, file_id: &str) -> Result<File, StorageError> {
        let token = self.token().await?;
        let metadata = to_metadata(self.client.get_metadata(&token, file_id).await?);
        let content = if metadata.is_folder() {
            Vec::new()
        } else {
            self.client.download_file(&token, file_id).await?
        };
        Ok(File { metadata, content })
    }

    #[instrument(skip(self, content), level = "debug", fields(tenant = %self.tenant_id, data_len = content.len()))]
    async fn save_file(
        &self,
        file_id: &str,
        content: &[u8],
        etag: &str,
    ) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;

        let current = self.client.get_metadata(&token, file_id).await?;
        if current.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "{} is a folder and has no content",
                file_id
            )));
        }
        let if_match = (!etag.is_empty()).then_some(etag);
        if let Some(expected) = if_match {
            let actual = current.version.as_deref().unwrap_or_default();
            if expected != actual {
                return Err(StorageError::PreconditionFailed(format!(
                    "{} is at version {}, caller had {}",
                    file_id, actual, expected
                )));
            }
        }

        let updated = self
            .client
            .update_content(&token, file_id, content, if_match)
            .await?;
        Ok(to_metadata(updated))
    }

    #[instrument(skip(self, content), level = "debug", fields(tenant = %self.tenant_id, data_len = content.len()))]
    async fn create_file(
        &self,
        name: &str,
        content: &[u8],
        folder_id: &str,
    ) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;
        let parents = vec![self.target_folder(folder_id)];
        let created = self
            .client
            .create_file(&token, &to_storage_name(name), &parents, content)
            .await?;
        debug!("Created file {} in {}", created.id, parents[0]);
        Ok(to_metadata(created))
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn create_folder(
        &self,
        name: &str,
        parents: &[String],
    ) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;
        let parents = if parents.is_empty() {
            vec![self.target_folder("")]
        } else {
            parents.to_vec()
        };
        let created = self.client.create_folder(&token, name, &parents).await?;
        Ok(to_metadata(created))
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn delete_file(&self, file_id: &str) -> Result<(), StorageError> {
        let token = self.token().await?;
        self.client.delete_file(&token, file_id).await
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn duplicate_file(&self, file_id: &str) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;
        let original = self.client.get_metadata(&token, file_id).await?;
        if original.is_folder() {
            return Err(StorageError::InvalidArgument(format!(
                "Cannot duplicate folder {}",
                file_id
            )));
        }

        let name = to_storage_name(&format!("Copy of {}", from_storage_name(&original.name)));
        let copy = self
            .client
            .copy_file(&token, file_id, &name, &original.parents)
            .await?;
        Ok(to_metadata(copy))
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn rename_file(
        &self,
        file_id: &str,
        new_name: &str,
    ) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;
        let current = self.client.get_metadata(&token, file_id).await?;
        let name = if current.is_folder() {
            new_name.to_string()
        } else {
            to_storage_name(new_name)
        };
        let updated = self
            .client
            .update_metadata(&token, file_id, &json!({ "name": name }))
            .await?;
        Ok(to_metadata(updated))
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn set_starred(
        &self,
        file_id: &str,
        starred: bool,
    ) -> Result<FileMetadata, StorageError> {
        let token = self.token().await?;
        let updated = self
            .client
            .update_metadata(&token, file_id, &json!({ "starred": starred }))
            .await?;
        Ok(to_metadata(updated))
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_starred(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let token = self.token().await?;
        let files = self
            .client
            .list_files(&token, "starred = true and trashed = false")
            .await?;
        let candidates = files.into_iter().filter(is_managed).collect();
        Ok(self.scope_to_base(&token, candidates).await)
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn search_files(&self, query: &str) -> Result<Vec<FileMetadata>, StorageError> {
        let token = self.token().await?;
        let literal = escape_query_literal(query);
        let q = format!(
            "(fullText contains '{q}' or name contains '{q}') and mimeType != '{folder}' and trashed = false",
            q = literal,
            folder = FOLDER_MIME_TYPE
        );
        let files = self.client.list_files(&token, &q).await?;
        let candidates = files
            .into_iter()
            .filter(|f| !f.is_folder() && f.name.ends_with(NOTE_SUFFIX))
            .collect();
        Ok(self.scope_to_base(&token, candidates).await)
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn list_root_folders(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let token = self.token().await?;
        let q = format!(
            "'{}' in parents and mimeType = '{}' and trashed = false",
            ROOT_FOLDER_ID, FOLDER_MIME_TYPE
        );
        let files = self.client.list_files(&token, &q).await?;
        Ok(files.into_iter().map(to_metadata).collect())
    }

    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn ensure_root_folder(&self, name: &str) -> Result<String, StorageError> {
        let token = self.token().await?;
        let q = format!(
            "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
            escape_query_literal(name),
            ROOT_FOLDER_ID,
            FOLDER_MIME_TYPE
        );
        if let Some(existing) = self.client.list_files(&token, &q).await?.into_iter().next() {
            debug!("Root folder {} already exists as {}", name, existing.id);
            return Ok(existing.id);
        }

        let created = self
            .client
            .create_folder(&token, name, &[ROOT_FOLDER_ID.to_string()])
            .await?;
        debug!("Created root folder {} as {}", name, created.id);
        Ok(created.id)
    }
}
