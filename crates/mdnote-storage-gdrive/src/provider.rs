use std::sync::Arc;

use async_trait::async_trait;
use mdnote_storage_core::{
    AdapterRegistry, StorageAdapter, StorageError, StorageProvider, TenantDirectory,
};
use tracing::{info, instrument, warn};

use crate::adapter::RemoteAdapter;
use crate::client::GDriveClient;

/// One `RemoteAdapter` per tenant, sharing a single HTTP client.
pub struct GDriveProvider {
    client: Arc<GDriveClient>,
    directory: Arc<dyn TenantDirectory>,
    adapters: AdapterRegistry<RemoteAdapter>,
}

impl GDriveProvider {
    pub fn new(client: Arc<GDriveClient>, directory: Arc<dyn TenantDirectory>) -> Self {
        Self {
            client,
            directory,
            adapters: AdapterRegistry::new(),
        }
    }

    /// Number of tenants with a live adapter.
    pub fn cached_tenants(&self) -> usize {
        self.adapters.len()
    }

    /// Resolve the concrete adapter, refreshing its base folder.
    #[instrument(skip(self), level = "debug")]
    pub async fn remote_adapter(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<RemoteAdapter>, StorageError> {
        let (adapter, created) = self.adapters.get_or_create(tenant_id, || {
            RemoteAdapter::new(tenant_id, Arc::clone(&self.client), Arc::clone(&self.directory))
        });
        if created {
            info!("Created Drive adapter for tenant {}", tenant_id);
        }

        match self.directory.base_folder_id(tenant_id).await {
            Ok(base) => adapter.set_base_folder_id(base),
            // A stale base folder only widens or narrows scoping; keep serving.
            Err(e) => warn!(
                "Failed to refresh base folder for tenant {}, keeping {:?}: {}",
                tenant_id,
                adapter.base_folder_id(),
                e
            ),
        }

        Ok(adapter)
    }
}

#[async_trait]
impl StorageProvider for GDriveProvider {
    async fn get_adapter(&self, tenant_id: &str) -> Result<Arc<dyn StorageAdapter>, StorageError> {
        let adapter: Arc<dyn StorageAdapter> = self.remote_adapter(tenant_id).await?;
        Ok(adapter)
    }
}
