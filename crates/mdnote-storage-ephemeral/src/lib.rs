//! Ephemeral tier: quota-bounded storage for unauthenticated sessions.
//!
//! Two stores back the same adapter:
//! - `MemoryItemStore`: process-local map for isolated use and tests
//! - `KvItemStore`: Cloudflare KV namespace with a sliding expiration

mod adapter;
mod kv;
mod provider;
mod store;

pub use adapter::{
    EphemeralAdapter, Quotas, DEFAULT_ITEM_TTL_SECS, DEFAULT_MAX_CONTENT_BYTES,
    DEFAULT_MAX_ITEMS, DEFAULT_MAX_NAME_LEN,
};
pub use kv::{KvClient, KvItemStore};
pub use provider::EphemeralProvider;
pub use store::{FileRecord, ItemStore, MemoryItemStore};
