use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::adapter::TenantDirectory;
use crate::error::StorageError;

/// Settings stored for one tenant.
#[derive(Debug, Clone, Default)]
pub struct TenantRecord {
    pub base_folder_id: Option<String>,
    pub access_token: Option<String>,
}

/// Process-local tenant directory for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tenants: RwLock<HashMap<String, TenantRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_base_folder(&self, tenant_id: &str, base_folder_id: Option<String>) {
        let mut tenants = self.tenants.write().expect("tenant directory poisoned");
        tenants.entry(tenant_id.to_string()).or_default().base_folder_id = base_folder_id;
    }

    pub fn set_access_token(&self, tenant_id: &str, token: impl Into<String>) {
        let mut tenants = self.tenants.write().expect("tenant directory poisoned");
        tenants.entry(tenant_id.to_string()).or_default().access_token = Some(token.into());
    }
}

#[async_trait]
impl TenantDirectory for InMemoryDirectory {
    async fn base_folder_id(&self, tenant_id: &str) -> Result<Option<String>, StorageError> {
        let tenants = self.tenants.read().expect("tenant directory poisoned");
        Ok(tenants
            .get(tenant_id)
            .and_then(|t| t.base_folder_id.clone())
            .filter(|id| !id.is_empty()))
    }

    async fn access_token(&self, tenant_id: &str) -> Result<String, StorageError> {
        let tenants = self.tenants.read().expect("tenant directory poisoned");
        tenants
            .get(tenant_id)
            .and_then(|t| t.access_token.clone())
            .ok_or_else(|| {
                StorageError::Forbidden(format!("No access token for tenant {}", tenant_id))
            })
    }
}
