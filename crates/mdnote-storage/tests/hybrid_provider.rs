//! End-to-end flows through the hybrid provider with process-local backends.

use std::sync::Arc;

use mdnote_session_lock::MemoryLockManager;
use mdnote_storage::{Backend, HybridProvider};
use mdnote_storage_core::{
    ConflictDetector, InMemoryDirectory, LockManager, StorageError, StorageProvider,
};
use mdnote_storage_ephemeral::{EphemeralProvider, MemoryItemStore};
use mdnote_storage_gdrive::{GDriveClient, GDriveProvider};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup(drive_base: &str) -> (Arc<InMemoryDirectory>, HybridProvider) {
    let directory = Arc::new(InMemoryDirectory::new());
    let remote = Arc::new(GDriveProvider::new(
        Arc::new(GDriveClient::with_base_url(drive_base)),
        directory.clone(),
    ));
    let ephemeral = Arc::new(EphemeralProvider::new(Arc::new(MemoryItemStore::new())));
    (directory, HybridProvider::new(remote, ephemeral))
}

#[tokio::test]
async fn test_ephemeral_tenant_nested_lifecycle() {
    let (_dir, provider) = setup("http://127.0.0.1:9");
    let tenant = "ephemeral-session-1";
    assert_eq!(provider.backend_for(tenant), Backend::Ephemeral);

    let adapter = provider.get_adapter(tenant).await.unwrap();
    let parent = adapter
        .create_folder("Parent", &["root".to_string()])
        .await
        .unwrap();
    let child = adapter
        .create_folder("Child", &[parent.id.clone()])
        .await
        .unwrap();
    let note = adapter.create_file("Note", b"", &child.id).await.unwrap();

    assert!(adapter.list_starred().await.unwrap().is_empty());
    adapter.set_starred(&note.id, true).await.unwrap();
    let starred: Vec<_> = adapter
        .list_starred()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(starred, vec![note.id.clone()]);

    adapter.delete_file(&parent.id).await.unwrap();
    assert!(matches!(
        adapter.get_file(&note.id).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_ephemeral_tenant_follows_directory_base_folder() {
    let directory = Arc::new(InMemoryDirectory::new());
    let provider = HybridProvider::with_directory(
        directory.clone(),
        Arc::new(GDriveClient::with_base_url("http://127.0.0.1:9")),
        Arc::new(MemoryItemStore::new()),
        chrono::Duration::hours(1),
    );
    let tenant = "ephemeral-demo";

    let adapter = provider.get_adapter(tenant).await.unwrap();
    let home = adapter
        .create_folder("Demo Notes", &["root".to_string()])
        .await
        .unwrap();
    let inside = adapter.create_file("Inside", b"", &home.id).await.unwrap();
    let outside = adapter.create_file("Outside", b"", "root").await.unwrap();
    adapter.set_starred(&inside.id, true).await.unwrap();
    adapter.set_starred(&outside.id, true).await.unwrap();
    assert_eq!(adapter.list_starred().await.unwrap().len(), 2);

    directory.set_base_folder(tenant, Some(home.id.clone()));
    let adapter = provider.get_adapter(tenant).await.unwrap();
    let starred: Vec<_> = adapter
        .list_starred()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(starred, vec![inside.id.clone()]);

    let created = adapter.create_file("Fresh", b"", "").await.unwrap();
    assert_eq!(created.parents, vec![home.id]);
}

#[tokio::test]
async fn test_conflict_preflight_and_precondition() {
    let (_dir, provider) = setup("http://127.0.0.1:9");
    let adapter = provider.get_adapter("ephemeral-session-2").await.unwrap();

    let created = adapter.create_file("a.md", b"x", "root").await.unwrap();
    let saved = adapter.save_file(&created.id, b"y", &created.etag).await.unwrap();

    let current = adapter.get_file(&created.id).await.unwrap();
    assert!(ConflictDetector::check_metadata(&created.etag, &current.metadata).is_conflict());
    assert!(!ConflictDetector::check_metadata(&saved.etag, &current.metadata).is_conflict());

    assert!(matches!(
        adapter.save_file(&created.id, b"z", &created.etag).await,
        Err(StorageError::PreconditionFailed(_))
    ));
    assert_eq!(adapter.get_file(&created.id).await.unwrap().content, b"y");
}

#[tokio::test]
async fn test_lock_handoff_between_users() {
    let locks = MemoryLockManager::new();

    locks.acquire_lock("f", "alice").await.unwrap();
    let err = locks.acquire_lock("f", "bob").await.unwrap_err();
    assert_eq!(err.kind().code(), "LOCKED");

    locks.release_lock("f", "alice").await.unwrap();
    let bob = locks.acquire_lock("f", "bob").await.unwrap();
    assert_eq!(
        locks.get_lock_status("f").await.unwrap(),
        Some(bob)
    );
}

#[tokio::test]
async fn test_remote_tenant_uses_drive_and_base_folder() {
    let server = MockServer::start().await;
    let (directory, provider) = setup(&server.uri());
    directory.set_access_token("user-7", "tok");
    directory.set_base_folder("user-7", Some("home".to_string()));

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{
                "id": "n1",
                "name": "Hello.md",
                "mimeType": "text/markdown",
                "version": "3",
                "parents": ["home"],
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = provider.get_adapter("user-7").await.unwrap();
    assert_eq!(adapter.backend_name(), "gdrive");

    let files = adapter.list_files("").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "Hello");
    assert_eq!(files[0].etag, "3");
}
