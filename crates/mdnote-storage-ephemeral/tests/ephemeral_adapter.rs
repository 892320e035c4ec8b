//! EphemeralAdapter behaviour over the process-local store.

use std::sync::Arc;

use mdnote_storage_core::{ConflictDetector, StorageAdapter, StorageError};
use mdnote_storage_ephemeral::{EphemeralAdapter, ItemStore, MemoryItemStore, Quotas};

fn setup() -> EphemeralAdapter {
    EphemeralAdapter::new("ephemeral-test", Arc::new(MemoryItemStore::new()))
}

fn root() -> Vec<String> {
    vec!["root".to_string()]
}

#[tokio::test]
async fn test_nested_star_then_recursive_delete() {
    let adapter = setup();

    let parent = adapter.create_folder("Parent", &root()).await.unwrap();
    let child = adapter
        .create_folder("Child", &[parent.id.clone()])
        .await
        .unwrap();
    let note = adapter.create_file("Note", b"body", &child.id).await.unwrap();

    assert!(adapter.list_starred().await.unwrap().is_empty());

    adapter.set_starred(&note.id, true).await.unwrap();
    let starred = adapter.list_starred().await.unwrap();
    assert_eq!(starred.len(), 1);
    assert_eq!(starred[0].id, note.id);
    assert_eq!(starred[0].name, "Note");

    adapter.delete_file(&parent.id).await.unwrap();
    for id in [&parent.id, &child.id, &note.id] {
        assert!(matches!(
            adapter.get_file(id).await,
            Err(StorageError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_stale_etag_is_rejected_and_content_kept() {
    let adapter = setup();

    let created = adapter.create_file("a.md", b"x", "root").await.unwrap();
    let e1 = created.etag.clone();
    assert_eq!(created.name, "a");

    let saved = adapter.save_file(&created.id, b"y", &e1).await.unwrap();
    let e2 = saved.etag.clone();
    assert_ne!(e1, e2);

    let err = adapter.save_file(&created.id, b"z", &e1).await.unwrap_err();
    assert!(matches!(err, StorageError::PreconditionFailed(_)));

    let file = adapter.get_file(&created.id).await.unwrap();
    assert_eq!(file.content, b"y");
    assert_eq!(file.metadata.etag, e2);
    assert!(ConflictDetector::has_conflict(&e1, &file.metadata.etag));
}

#[tokio::test]
async fn test_empty_etag_forces_write() {
    let adapter = setup();
    let created = adapter.create_file("n", b"1", "").await.unwrap();
    let saved = adapter.save_file(&created.id, b"2", "").await.unwrap();
    assert_ne!(saved.etag, created.etag);
    assert_eq!(saved.size, 1);
    assert_eq!(adapter.get_file(&created.id).await.unwrap().content, b"2");
}

#[tokio::test]
async fn test_every_mutation_changes_etag() {
    let adapter = setup();
    let created = adapter.create_file("n", b"1", "").await.unwrap();
    let renamed = adapter.rename_file(&created.id, "m").await.unwrap();
    let starred = adapter.set_starred(&created.id, true).await.unwrap();
    let unstarred = adapter.set_starred(&created.id, false).await.unwrap();

    let etags = [&created.etag, &renamed.etag, &starred.etag, &unstarred.etag];
    for (i, a) in etags.iter().enumerate() {
        for b in &etags[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[tokio::test]
async fn test_list_files_returns_direct_children_only() {
    let adapter = setup();
    let folder = adapter.create_folder("Docs", &root()).await.unwrap();
    let nested = adapter.create_folder("Deep", &[folder.id.clone()]).await.unwrap();
    adapter.create_file("inside", b"", &folder.id).await.unwrap();
    adapter.create_file("deeper", b"", &nested.id).await.unwrap();
    adapter.create_file("top", b"", "").await.unwrap();

    let mut names: Vec<_> = adapter
        .list_files(&folder.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Deep", "inside"]);

    let mut top: Vec<_> = adapter
        .list_files("")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    top.sort();
    assert_eq!(top, vec!["Docs", "top"]);
}

#[tokio::test]
async fn test_empty_folder_uses_base_folder() {
    let adapter = setup();
    let base = adapter.create_folder("Home", &root()).await.unwrap();
    adapter.set_base_folder_id(Some(base.id.clone()));

    let note = adapter.create_file("n", b"", "").await.unwrap();
    let folder = adapter.create_folder("f", &[]).await.unwrap();
    assert_eq!(note.parents, vec![base.id.clone()]);
    assert_eq!(folder.parents, vec![base.id.clone()]);
    assert_eq!(adapter.list_files("").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_search_is_scoped_and_case_insensitive() {
    let adapter = setup();
    let base = adapter.create_folder("Home", &root()).await.unwrap();
    let sub = adapter.create_folder("plans", &[base.id.clone()]).await.unwrap();
    let by_name = adapter.create_file("Project PLAN", b"", &sub.id).await.unwrap();
    let by_content = adapter
        .create_file("notes", b"the Plan is simple", &base.id)
        .await
        .unwrap();
    adapter.create_file("plan outside", b"", "root").await.unwrap();
    adapter.set_base_folder_id(Some(base.id.clone()));

    let mut ids: Vec<_> = adapter
        .search_files("plan")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    ids.sort();
    let mut expected = vec![by_name.id, by_content.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_duplicate_copies_content_and_leaves_original() {
    let adapter = setup();
    let folder = adapter.create_folder("F", &root()).await.unwrap();
    let original = adapter.create_file("Draft", b"text", &folder.id).await.unwrap();

    let copy = adapter.duplicate_file(&original.id).await.unwrap();
    assert_ne!(copy.id, original.id);
    assert_ne!(copy.etag, original.etag);
    assert_eq!(copy.name, "Copy of Draft");
    assert_eq!(copy.parents, original.parents);

    let copied = adapter.get_file(&copy.id).await.unwrap();
    assert_eq!(copied.content, b"text");
    let unchanged = adapter.get_file(&original.id).await.unwrap();
    assert_eq!(unchanged.metadata, original);
}

#[tokio::test]
async fn test_duplicate_folder_is_rejected() {
    let adapter = setup();
    let folder = adapter.create_folder("F", &root()).await.unwrap();
    assert!(matches!(
        adapter.duplicate_file(&folder.id).await,
        Err(StorageError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_rename_applies_suffix_to_notes_only() {
    let store = Arc::new(MemoryItemStore::new());
    let adapter = EphemeralAdapter::new("ephemeral-test", store.clone());
    let folder = adapter.create_folder("Old", &root()).await.unwrap();
    let note = adapter.create_file("old", b"", "").await.unwrap();

    assert_eq!(adapter.rename_file(&folder.id, "New").await.unwrap().name, "New");
    assert_eq!(adapter.rename_file(&note.id, "new").await.unwrap().name, "new");

    let stored_folder = store.get("ephemeral-test", &folder.id).await.unwrap().unwrap();
    let stored_note = store.get("ephemeral-test", &note.id).await.unwrap().unwrap();
    assert_eq!(stored_folder.name, "New");
    assert_eq!(stored_note.name, "new.md");
}

#[tokio::test]
async fn test_root_folders_ignore_base_folder() {
    let adapter = setup();
    let a = adapter.create_folder("A", &root()).await.unwrap();
    adapter.create_folder("B", &[]).await.unwrap();
    adapter.create_folder("nested", &[a.id.clone()]).await.unwrap();
    adapter.create_file("file", b"", "").await.unwrap();
    adapter.set_base_folder_id(Some(a.id.clone()));

    let mut names: Vec<_> = adapter
        .list_root_folders()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn test_ensure_root_folder_is_idempotent() {
    let adapter = setup();
    let first = adapter.ensure_root_folder("mdnote").await.unwrap();
    let second = adapter.ensure_root_folder("mdnote").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(adapter.list_root_folders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_quotas_are_enforced() {
    let adapter = setup().with_quotas(Quotas {
        max_content_bytes: 4,
        max_name_len: 5,
        max_items: 2,
    });

    assert_eq!(
        adapter.create_file("toolong", b"", "").await.unwrap_err(),
        StorageError::NameTooLong { len: 7, max: 5 }
    );
    assert_eq!(
        adapter.create_file("a", b"12345", "").await.unwrap_err(),
        StorageError::ContentTooLarge { size: 5, max: 4 }
    );

    let note = adapter.create_file("a", b"1234", "").await.unwrap();
    assert_eq!(
        adapter.save_file(&note.id, b"12345", "").await.unwrap_err(),
        StorageError::ContentTooLarge { size: 5, max: 4 }
    );
    assert_eq!(
        adapter.rename_file(&note.id, "sixsix").await.unwrap_err(),
        StorageError::NameTooLong { len: 6, max: 5 }
    );

    adapter.create_folder("f", &root()).await.unwrap();
    for err in [
        adapter.create_file("b", b"", "").await.unwrap_err(),
        adapter.create_folder("g", &root()).await.unwrap_err(),
        adapter.duplicate_file(&note.id).await.unwrap_err(),
        adapter.ensure_root_folder("h").await.unwrap_err(),
    ] {
        assert_eq!(err, StorageError::ItemLimitReached { max: 2 });
    }

    // An existing root folder is still found at the limit.
    assert!(adapter.ensure_root_folder("f").await.is_ok());
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let store = Arc::new(MemoryItemStore::new());
    let a = EphemeralAdapter::new("ephemeral-a", store.clone());
    let b = EphemeralAdapter::new("ephemeral-b", store);

    let note = a.create_file("mine", b"", "").await.unwrap();
    assert!(b.list_files("").await.unwrap().is_empty());
    assert!(matches!(
        b.get_file(&note.id).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let adapter = setup();
    assert!(matches!(
        adapter.delete_file("nope").await,
        Err(StorageError::NotFound(_))
    ));
}
