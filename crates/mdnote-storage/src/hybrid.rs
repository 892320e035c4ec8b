//! Tenant routing between the remote and ephemeral tiers.
//!
//! The decision is a pure function of the tenant identifier: IDs carrying
//! the ephemeral prefix go to the ephemeral tier, everything else to the
//! remote tier. Nothing about the routing is persisted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use mdnote_storage_core::{StorageAdapter, StorageError, StorageProvider, TenantDirectory};
use mdnote_storage_ephemeral::{EphemeralProvider, ItemStore};
use mdnote_storage_gdrive::{GDriveClient, GDriveProvider};
use tracing::{debug, instrument};

pub const DEFAULT_EPHEMERAL_PREFIX: &str = "ephemeral-";

/// Tier serving a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Ephemeral,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::Ephemeral => "ephemeral",
        }
    }
}

pub struct HybridProvider {
    remote: Arc<dyn StorageProvider>,
    ephemeral: Arc<dyn StorageProvider>,
    prefix: String,
}

impl HybridProvider {
    pub fn new(remote: Arc<dyn StorageProvider>, ephemeral: Arc<dyn StorageProvider>) -> Self {
        Self {
            remote,
            ephemeral,
            prefix: DEFAULT_EPHEMERAL_PREFIX.to_string(),
        }
    }

    /// Both tiers backed by one tenant directory, so a base folder change
    /// reaches remote and ephemeral tenants alike.
    pub fn with_directory(
        directory: Arc<dyn TenantDirectory>,
        drive: Arc<GDriveClient>,
        ephemeral_store: Arc<dyn ItemStore>,
        ephemeral_ttl: Duration,
    ) -> Self {
        let remote = Arc::new(GDriveProvider::new(drive, Arc::clone(&directory)));
        let ephemeral = Arc::new(
            EphemeralProvider::new(ephemeral_store)
                .with_directory(directory)
                .with_ttl(ephemeral_ttl),
        );
        Self::new(remote, ephemeral)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Which tier `tenant_id` is routed to.
    pub fn backend_for(&self, tenant_id: &str) -> Backend {
        if !self.prefix.is_empty() && tenant_id.starts_with(&self.prefix) {
            Backend::Ephemeral
        } else {
            Backend::Remote
        }
    }
}

#[async_trait]
impl StorageProvider for HybridProvider {
    #[instrument(skip(self), level = "debug")]
    async fn get_adapter(&self, tenant_id: &str) -> Result<Arc<dyn StorageAdapter>, StorageError> {
        let backend = self.backend_for(tenant_id);
        debug!("Routing tenant {} to {} tier", tenant_id, backend.as_str());
        match backend {
            Backend::Ephemeral => self.ephemeral.get_adapter(tenant_id).await,
            Backend::Remote => self.remote.get_adapter(tenant_id).await,
        }
    }
}
