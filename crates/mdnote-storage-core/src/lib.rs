//! Core traits and types for mdnote storage backends.
//!
//! This crate defines the abstractions shared between the remote and ephemeral tiers:
//! - `StorageAdapter`: File and folder operations against one tenant's hierarchy
//! - `StorageProvider`: Per-tenant adapter resolution
//! - `TenantDirectory`: Base-folder and access-token lookup for a tenant
//! - `LockManager`: Heartbeat-renewed editing claims on individual files
//! - `ConflictDetector`: Advisory ETag comparison before a write

mod adapter;
mod ancestry;
mod conflict;
mod directory;
mod error;
mod lock;
mod model;
mod registry;

pub use adapter::{StorageAdapter, StorageProvider, TenantDirectory};
pub use ancestry::{AncestryWalker, ParentLookup};
pub use conflict::{ConflictCheck, ConflictDetector};
pub use directory::{InMemoryDirectory, TenantRecord};
pub use error::{ErrorKind, StorageError};
pub use lock::{
    EditingSession, LockManager, LockPolicy, DEFAULT_LOCK_TTL_SECS, HEARTBEAT_INTERVAL_SECS,
};
pub use model::{
    from_storage_name, is_root_parent, resolve_target_folder, to_storage_name, File, FileMetadata,
    FOLDER_MIME_TYPE, NOTE_MIME_TYPE, NOTE_SUFFIX, ROOT_FOLDER_ID,
};
pub use registry::AdapterRegistry;
