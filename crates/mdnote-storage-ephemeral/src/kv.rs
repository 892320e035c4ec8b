//! Cloudflare KV backed record store.
//!
//! Records live under `{tenant}/{id}` keys as JSON. Every put carries an
//! `expiration_ttl` so KV disposes of abandoned data on its own; the adapter
//! still re-checks `expires_at` on read because KV eviction is not immediate.

use async_trait::async_trait;
use mdnote_storage_core::StorageError;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::store::{FileRecord, ItemStore};

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// KV rejects expirations shorter than a minute.
const MIN_EXPIRATION_TTL_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct KeyListResponse {
    #[serde(default)]
    result: Vec<KeyEntry>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

/// Cloudflare KV REST API client.
///
/// Uses the Cloudflare API v4 to interact with one KV namespace. Failures are
/// surfaced as `Unavailable`; rate limiting is not retried here.
pub struct KvClient {
    http_client: HttpClient,
    api_base: String,
    account_id: String,
    namespace_id: String,
    api_token: String,
}

impl KvClient {
    pub fn new(account_id: String, namespace_id: String, api_token: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            account_id,
            namespace_id,
            api_token,
        }
    }

    /// Override the API host (tests, proxies).
    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn namespace_url(&self) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}",
            self.api_base, self.account_id, self.namespace_id
        )
    }

    fn value_url(&self, key: &str) -> String {
        format!("{}/values/{}", self.namespace_url(), urlencoding::encode(key))
    }

    async fn send(&self, request: RequestBuilder, op: &str) -> Result<Response, StorageError> {
        request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("KV {} request failed: {}", op, e)))
    }

    async fn failure(response: Response, op: &str) -> StorageError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("KV {} rate limited", op);
        }
        StorageError::Unavailable(format!("KV {} failed with status {}: {}", op, status, text))
    }

    /// Get a value from KV.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let response = self
            .send(self.http_client.get(self.value_url(key)), "GET")
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("KV key not found: {}", key);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::failure(response, "GET").await);
        }

        let value = response
            .text()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to read KV response: {}", e)))?;

        debug!("KV GET {} ({} bytes)", key, value.len());
        Ok(Some(value))
    }

    /// Put a value to KV with a physical expiry.
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn put(
        &self,
        key: &str,
        value: &str,
        expiration_ttl_secs: i64,
    ) -> Result<(), StorageError> {
        let ttl = expiration_ttl_secs.max(MIN_EXPIRATION_TTL_SECS).to_string();
        let request = self
            .http_client
            .put(self.value_url(key))
            .query(&[("expiration_ttl", ttl.as_str())])
            .header("Content-Type", "text/plain")
            .body(value.to_string());

        let response = self.send(request, "PUT").await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, "PUT").await);
        }

        debug!("KV PUT {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Delete a value from KV.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let response = self
            .send(self.http_client.delete(self.value_url(key)), "DELETE")
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::failure(response, "DELETE").await);
        }

        debug!("KV DELETE {}", key);
        Ok(true)
    }

    /// List every key under `prefix`, following cursors.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let url = format!("{}/keys", self.namespace_url());
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self.http_client.get(&url).query(&[("prefix", prefix)]);
            if let Some(c) = cursor.as_deref() {
                request = request.query(&[("cursor", c)]);
            }

            let response = self.send(request, "LIST").await?;
            if !response.status().is_success() {
                return Err(Self::failure(response, "LIST").await);
            }
            let page: KeyListResponse = response
                .json()
                .await
                .map_err(|e| StorageError::Serialization(format!("Invalid KV key list: {}", e)))?;

            keys.extend(page.result.into_iter().map(|k| k.name));
            match page.result_info.and_then(|i| i.cursor) {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!("KV LIST {} ({} keys)", prefix, keys.len());
        Ok(keys)
    }
}

/// `ItemStore` over a KV namespace, one key per record.
pub struct KvItemStore {
    kv: KvClient,
}

impl KvItemStore {
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    /// Key for one record. `/` separates tenant and ID, so neither part may
    /// contain it; otherwise one tenant's key could name another tenant's record.
    fn key(tenant_id: &str, id: &str) -> Option<String> {
        if tenant_id.contains('/') || id.contains('/') {
            return None;
        }
        Some(format!("{}/{}", tenant_id, id))
    }

    fn decode(raw: &str) -> Result<FileRecord, StorageError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[async_trait]
impl ItemStore for KvItemStore {
    fn backend_name(&self) -> &'static str {
        "kv"
    }

    async fn scan(&self, tenant_id: &str) -> Result<Vec<FileRecord>, StorageError> {
        if tenant_id.contains('/') {
            return Ok(Vec::new());
        }
        let keys = self.kv.list_keys(&format!("{}/", tenant_id)).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // Listing and reading are not atomic; a key may vanish in between.
            if let Some(raw) = self.kv.get(&key).await? {
                let record = Self::decode(&raw)?;
                if record.tenant_id == tenant_id {
                    records.push(record);
                } else {
                    warn!("Skipping KV key {} owned by tenant {}", key, record.tenant_id);
                }
            }
        }
        Ok(records)
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<FileRecord>, StorageError> {
        let Some(key) = Self::key(tenant_id, id) else {
            return Ok(None);
        };
        match self.kv.get(&key).await? {
            Some(raw) => Ok(Some(Self::decode(&raw)?).filter(|r| r.tenant_id == tenant_id)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &FileRecord, ttl_secs: i64) -> Result<(), StorageError> {
        let key = Self::key(&record.tenant_id, &record.id).ok_or_else(|| {
            StorageError::InvalidArgument(format!(
                "Tenant and item IDs must not contain '/': {}/{}",
                record.tenant_id, record.id
            ))
        })?;
        let json = serde_json::to_string(record)?;
        self.kv.put(&key, &json, ttl_secs).await
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError> {
        match Self::key(tenant_id, id) {
            Some(key) => self.kv.delete(&key).await,
            None => Ok(false),
        }
    }
}
