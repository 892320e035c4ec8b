//! Remote tier: Google Drive backed storage adapter.

mod adapter;
mod client;
mod provider;

pub use adapter::RemoteAdapter;
pub use client::{escape_query_literal, DriveFile, GDriveClient, DEFAULT_API_BASE};
pub use provider::GDriveProvider;
