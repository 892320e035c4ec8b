use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use mdnote_storage_core::{
    AdapterRegistry, StorageAdapter, StorageError, StorageProvider, TenantDirectory,
};
use tracing::{info, instrument, warn};

use crate::adapter::{EphemeralAdapter, Quotas, DEFAULT_ITEM_TTL_SECS};
use crate::store::ItemStore;

/// One `EphemeralAdapter` per tenant over a shared store.
pub struct EphemeralProvider {
    store: Arc<dyn ItemStore>,
    directory: Option<Arc<dyn TenantDirectory>>,
    quotas: Quotas,
    ttl: Duration,
    adapters: AdapterRegistry<EphemeralAdapter>,
}

impl EphemeralProvider {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            directory: None,
            quotas: Quotas::default(),
            ttl: Duration::seconds(DEFAULT_ITEM_TTL_SECS),
            adapters: AdapterRegistry::new(),
        }
    }

    /// Read base folders from `directory` on every resolution.
    pub fn with_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_quotas(mut self, quotas: Quotas) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cached_tenants(&self) -> usize {
        self.adapters.len()
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn ephemeral_adapter(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<EphemeralAdapter>, StorageError> {
        let (adapter, created) = self.adapters.get_or_create(tenant_id, || {
            EphemeralAdapter::new(tenant_id, Arc::clone(&self.store))
                .with_quotas(self.quotas)
                .with_ttl(self.ttl)
        });
        if created {
            info!(
                "Created ephemeral adapter for tenant {} ({} store)",
                tenant_id,
                self.store.backend_name()
            );
        }

        if let Some(directory) = &self.directory {
            match directory.base_folder_id(tenant_id).await {
                Ok(base) => adapter.set_base_folder_id(base),
                Err(e) => warn!(
                    "Failed to refresh base folder for tenant {}, keeping {:?}: {}",
                    tenant_id,
                    adapter.base_folder_id(),
                    e
                ),
            }
        }

        Ok(adapter)
    }
}

#[async_trait]
impl StorageProvider for EphemeralProvider {
    async fn get_adapter(&self, tenant_id: &str) -> Result<Arc<dyn StorageAdapter>, StorageError> {
        let adapter: Arc<dyn StorageAdapter> = self.ephemeral_adapter(tenant_id).await?;
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use mdnote_storage_core::InMemoryDirectory;

    use super::*;
    use crate::store::MemoryItemStore;

    #[tokio::test]
    async fn test_concurrent_first_resolution_yields_one_adapter() {
        let provider = Arc::new(EphemeralProvider::new(Arc::new(MemoryItemStore::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(
                    async move { provider.ephemeral_adapter("ephemeral-x").await.unwrap() },
                )
            })
            .collect();

        let mut adapters = Vec::new();
        for handle in handles {
            adapters.push(handle.await.unwrap());
        }
        assert!(adapters.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(provider.cached_tenants(), 1);
    }

    #[tokio::test]
    async fn test_base_folder_follows_directory() {
        let directory = Arc::new(InMemoryDirectory::new());
        let provider = EphemeralProvider::new(Arc::new(MemoryItemStore::new()))
            .with_directory(directory.clone());

        let adapter = provider.ephemeral_adapter("ephemeral-x").await.unwrap();
        assert_eq!(adapter.base_folder_id(), None);

        directory.set_base_folder("ephemeral-x", Some("home".to_string()));
        provider.get_adapter("ephemeral-x").await.unwrap();
        assert_eq!(adapter.base_folder_id().as_deref(), Some("home"));
    }
}
