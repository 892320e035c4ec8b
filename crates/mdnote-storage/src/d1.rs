//! D1-backed tenant directory via the Cloudflare REST API.
//!
//! Reads the `user_tokens` table maintained by the authentication layer:
//! ```text
//! user_tokens(user_id TEXT PRIMARY KEY, access_token TEXT,
//!             token_expires_at TEXT, base_folder_id TEXT, updated_at TEXT)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mdnote_storage_core::{StorageError, TenantDirectory};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Row of `user_tokens` as returned by D1.
#[derive(Debug, Clone, Deserialize)]
pub struct UserTokenRow {
    pub user_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_expires_at: Option<String>,
    #[serde(default)]
    pub base_folder_id: Option<String>,
}

impl UserTokenRow {
    fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc) <= now)
            .unwrap_or(false)
    }
}

/// D1 query request body.
#[derive(Serialize)]
struct D1QueryRequest {
    sql: String,
    params: Vec<String>,
}

/// D1 API response structure.
#[derive(Deserialize)]
struct D1Response {
    success: bool,
    result: Option<Vec<D1QueryResult>>,
    errors: Option<Vec<D1Error>>,
}

#[derive(Deserialize)]
struct D1QueryResult {
    results: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct D1Error {
    message: String,
}

/// Tenant directory over the `user_tokens` D1 table.
pub struct D1Directory {
    http: Client,
    api_base: String,
    account_id: String,
    api_token: String,
    database_id: String,
}

impl D1Directory {
    pub fn new(account_id: String, api_token: String, database_id: String) -> Self {
        Self {
            http: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            account_id,
            api_token,
            database_id,
        }
    }

    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn query_url(&self) -> String {
        format!(
            "{}/accounts/{}/d1/database/{}/query",
            self.api_base, self.account_id, self.database_id
        )
    }

    /// Execute a D1 query and return raw result rows.
    async fn execute_query(
        &self,
        sql: &str,
        params: Vec<String>,
    ) -> Result<Vec<serde_json::Value>, StorageError> {
        let query = D1QueryRequest {
            sql: sql.to_string(),
            params,
        };

        let response = self
            .http
            .post(self.query_url())
            .bearer_auth(&self.api_token)
            .json(&query)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("D1 request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to read D1 response: {}", e)))?;

        if !status.is_success() {
            return Err(StorageError::Unavailable(format!(
                "D1 API returned {}: {}",
                status, body
            )));
        }

        let d1_response: D1Response = serde_json::from_str(&body)?;

        if !d1_response.success {
            let error_msg = d1_response
                .errors
                .map(|errs| {
                    errs.into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| "Unknown D1 error".to_string());
            return Err(StorageError::Unavailable(format!(
                "D1 query failed: {}",
                error_msg
            )));
        }

        Ok(d1_response
            .result
            .and_then(|mut r| r.pop())
            .map(|qr| qr.results)
            .unwrap_or_default())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get_user(&self, tenant_id: &str) -> Result<Option<UserTokenRow>, StorageError> {
        let results = self
            .execute_query(
                "SELECT user_id, access_token, token_expires_at, base_folder_id \
                 FROM user_tokens WHERE user_id = ?1",
                vec![tenant_id.to_string()],
            )
            .await?;

        match results.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Point the tenant's recursive listings at a new folder.
    #[instrument(skip(self), level = "debug")]
    pub async fn update_base_folder(
        &self,
        tenant_id: &str,
        base_folder_id: &str,
    ) -> Result<(), StorageError> {
        self.execute_query(
            "UPDATE user_tokens SET base_folder_id = ?1, updated_at = ?2 WHERE user_id = ?3",
            vec![
                base_folder_id.to_string(),
                Utc::now().to_rfc3339(),
                tenant_id.to_string(),
            ],
        )
        .await?;
        debug!("Base folder for {} set to {}", tenant_id, base_folder_id);
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for D1Directory {
    async fn base_folder_id(&self, tenant_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .get_user(tenant_id)
            .await?
            .and_then(|row| row.base_folder_id)
            .filter(|id| !id.is_empty()))
    }

    async fn access_token(&self, tenant_id: &str) -> Result<String, StorageError> {
        let row = self.get_user(tenant_id).await?.ok_or_else(|| {
            StorageError::Forbidden(format!("No Drive connection for tenant {}", tenant_id))
        })?;

        if row.token_expired(Utc::now()) {
            // Refresh is owned by the authentication layer.
            warn!("Stored access token for {} has expired", tenant_id);
            return Err(StorageError::Unavailable(format!(
                "Access token for tenant {} has expired",
                tenant_id
            )));
        }

        row.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            StorageError::Forbidden(format!("No access token for tenant {}", tenant_id))
        })
    }
}
