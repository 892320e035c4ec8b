//! Google Drive API v3 client wrapper.
//!
//! Token is passed per-call by the caller (the adapter resolves it from the
//! tenant directory). Every response status is classified into a
//! `StorageError` so callers can tell missing items and stale versions apart
//! from transport failures.

use mdnote_storage_core::{StorageError, FOLDER_MIME_TYPE, NOTE_MIME_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,size,version,parents,starred";

const MULTIPART_BOUNDARY: &str = "mdnote_drive_boundary";

/// File resource returned by Google Drive.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    /// Drive reports sizes as decimal strings
    #[serde(default)]
    pub size: Option<String>,
    /// Monotonic version, bumped on any content or metadata change
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub starred: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentsOnly {
    #[serde(default)]
    parents: Vec<String>,
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Google Drive API client (stateless, token provided per-call).
pub struct GDriveClient {
    http: Client,
    base_url: String,
}

impl Default for GDriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GDriveClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Point the client at another host (tests, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/drive/v3/files/{}", self.base_url, file_id)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.base_url)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<Response, StorageError> {
        let resp = request
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", context, e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = format!("{} ({}): {}", context, status, body);
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::NotFound(message),
            StatusCode::PRECONDITION_FAILED => StorageError::PreconditionFailed(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Forbidden(message),
            StatusCode::BAD_REQUEST => StorageError::InvalidArgument(message),
            _ => StorageError::Unavailable(message),
        })
    }

    async fn parse_file(resp: Response) -> Result<DriveFile, StorageError> {
        resp.json()
            .await
            .map_err(|e| StorageError::Serialization(format!("Invalid Drive file resource: {}", e)))
    }

    /// Run a files.list query, following pagination to the end.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn list_files(
        &self,
        token: &str,
        query: &str,
    ) -> Result<Vec<DriveFile>, StorageError> {
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.files_url())
                .bearer_auth(token)
                .query(&[("q", query), ("fields", fields.as_str()), ("pageSize", "1000")]);
            if let Some(page) = page_token.as_deref() {
                request = request.query(&[("pageToken", page)]);
            }

            let page: FileList = self
                .send(request, "Google Drive list error")
                .await?
                .json()
                .await
                .map_err(|e| {
                    StorageError::Serialization(format!("Invalid Drive file list: {}", e))
                })?;

            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} Drive files", files.len());
        Ok(files)
    }

    /// Get file metadata from Google Drive.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn get_metadata(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<DriveFile, StorageError> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]);

        let resp = self.send(request, "Google Drive metadata error").await?;
        Self::parse_file(resp).await
    }

    /// Get only the parent links of an item.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn get_parents(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("fields", "id,parents")]);

        let parents: ParentsOnly = self
            .send(request, "Google Drive parent lookup error")
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Serialization(format!("Invalid Drive parents: {}", e)))?;
        Ok(parents.parents)
    }

    /// Download file content from Google Drive.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn download_file(&self, token: &str, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")]);

        let bytes = self
            .send(request, "Google Drive download error")
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Google Drive download error: {}", e)))?;

        debug!("Downloaded {} bytes for file {}", bytes.len(), file_id);
        Ok(bytes.to_vec())
    }

    /// Create a folder.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parents: &[String],
    ) -> Result<DriveFile, StorageError> {
        let request = self
            .http
            .post(self.files_url())
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": parents,
            }));

        let resp = self.send(request, "Google Drive create folder error").await?;
        Self::parse_file(resp).await
    }

    /// Create a file with content in a single multipart upload.
    #[instrument(skip(self, token, content), level = "debug", fields(data_len = content.len()))]
    pub async fn create_file(
        &self,
        token: &str,
        name: &str,
        parents: &[String],
        content: &[u8],
    ) -> Result<DriveFile, StorageError> {
        let metadata = json!({
            "name": name,
            "mimeType": NOTE_MIME_TYPE,
            "parents": parents,
        });

        let mut body = Vec::with_capacity(content.len() + 256);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
                b = MULTIPART_BOUNDARY,
                m = metadata,
                t = NOTE_MIME_TYPE
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--", MULTIPART_BOUNDARY).as_bytes());

        let request = self
            .http
            .post(self.upload_url())
            .bearer_auth(token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", FILE_FIELDS),
                ("supportsAllDrives", "true"),
            ])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body);

        let resp = self.send(request, "Google Drive create file error").await?;
        Self::parse_file(resp).await
    }

    /// Replace file content. `if_match` is forwarded as an `If-Match` header.
    #[instrument(skip(self, token, content), level = "debug", fields(data_len = content.len()))]
    pub async fn update_content(
        &self,
        token: &str,
        file_id: &str,
        content: &[u8],
        if_match: Option<&str>,
    ) -> Result<DriveFile, StorageError> {
        let mut request = self
            .http
            .patch(format!("{}/{}", self.upload_url(), file_id))
            .bearer_auth(token)
            .query(&[
                ("uploadType", "media"),
                ("fields", FILE_FIELDS),
                ("supportsAllDrives", "true"),
            ])
            .header("Content-Type", NOTE_MIME_TYPE)
            .body(content.to_vec());
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag);
        }

        let resp = self.send(request, "Google Drive upload error").await?;
        debug!("Updated file {} ({} bytes)", file_id, content.len());
        Self::parse_file(resp).await
    }

    /// Patch file metadata (name, starred).
    #[instrument(skip(self, token), level = "debug")]
    pub async fn update_metadata(
        &self,
        token: &str,
        file_id: &str,
        patch: &serde_json::Value,
    ) -> Result<DriveFile, StorageError> {
        let request = self
            .http
            .patch(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .json(patch);

        let resp = self.send(request, "Google Drive metadata update error").await?;
        Self::parse_file(resp).await
    }

    /// Server-side copy.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn copy_file(
        &self,
        token: &str,
        file_id: &str,
        name: &str,
        parents: &[String],
    ) -> Result<DriveFile, StorageError> {
        let request = self
            .http
            .post(format!("{}/copy", self.file_url(file_id)))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .json(&json!({ "name": name, "parents": parents }));

        let resp = self.send(request, "Google Drive copy error").await?;
        Self::parse_file(resp).await
    }

    /// Delete permanently. Drive removes a folder's descendants with it.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn delete_file(&self, token: &str, file_id: &str) -> Result<(), StorageError> {
        let request = self
            .http
            .delete(self.file_url(file_id))
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")]);

        self.send(request, "Google Drive delete error").await?;
        debug!("Deleted file {}", file_id);
        Ok(())
    }
}
