//! History and settings survive reopening a SQLite database

use clipshelf::database::SqliteDocumentStore;
use clipshelf::repository::ITEMS_COLLECTION;
use clipshelf::{ClipboardStore, CopyMode, ItemKind, MemoryClipboard, SettingsPatch, SyncConfig};
use std::path::Path;
use std::sync::Arc;

fn open(path: &Path) -> ClipboardStore {
    ClipboardStore::open(path, Arc::new(MemoryClipboard::new())).unwrap()
}

#[tokio::test]
async fn test_items_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.sqlite");

    let (pinned_id, image_id) = {
        let store = open(&path);
        let list = store.list();
        list.add_text("older", false).await.unwrap();
        let pinned = list.add_text("pinned", false).await.unwrap().unwrap();
        let image = list.add_image(vec![0x89, b'P', b'N', b'G'], "image/png", false).await.unwrap().unwrap();
        store.set_pinned(pinned.id(), true).await.unwrap();
        (pinned.id().to_string(), image.id().to_string())
    };

    let store = open(&path);
    store.load().await.unwrap();
    let items = store.list().items();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].id(), pinned_id);
    assert!(items[0].is_pinned());
    assert_eq!(items[1].id(), image_id);
    assert_eq!(items[1].kind(), ItemKind::Image);
    assert_eq!(items[1].blob.as_ref().unwrap().bytes, vec![0x89, b'P', b'N', b'G']);
    assert_eq!(items[2].text(), Some("older"));
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite");

    {
        let store = open(&path);
        assert!(store.settings().await.enable_pin);
        store
            .save_settings(SettingsPatch { copy_mode: Some(CopyMode::DoubleTap), ..Default::default() })
            .await
            .unwrap();
    }

    let settings = open(&path).settings().await;
    assert!(settings.enable_pin);
    assert_eq!(settings.copy_mode, CopyMode::DoubleTap);
}

#[tokio::test]
async fn test_concurrent_add_dropped_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteDocumentStore::open(dir.path().join("race.sqlite")).unwrap());
    let store = ClipboardStore::with_store(db.clone(), Arc::new(MemoryClipboard::new()), SyncConfig::default());

    let (a, b) = tokio::join!(store.list().add_text("a", false), store.list().add_text("b", false));
    assert_eq!([a.unwrap(), b.unwrap()].iter().flatten().count(), 1);
    assert_eq!(db.count(ITEMS_COLLECTION).unwrap(), 1);
}
