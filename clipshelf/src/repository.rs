//! Item repository: CRUD and ordering over the document store
//!
//! Every operation re-reads what it needs from the store; nothing is cached
//! here. Mutations patch the existing JSON body instead of re-serializing the
//! item so fields written by other versions survive, and pass the body they
//! read as `previous` so a concurrent writer surfaces as a `Conflict`.

use crate::codec;
use crate::interface::{
    ClipShelfError, ClipShelfResult, Clock, Document, DocumentStore, FindOptions, Query, SystemClock,
};
use crate::models::{
    normalize_timestamp, ClipboardItem, ClipboardMetadata, ImageBlob, StoredContent, StoredItem,
};
use crate::ordering;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ITEMS_COLLECTION: &str = "clipboard-items";

#[derive(Clone)]
pub struct ItemRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl ItemRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn load_documents(&self) -> ClipShelfResult<Vec<Document>> {
        Ok(self
            .store
            .find(ITEMS_COLLECTION, &Query::All, &FindOptions::sorted_by("order"))
            .await?)
    }

    /// Every decodable item in display order. Malformed documents are skipped.
    async fn load_sorted(&self) -> ClipShelfResult<Vec<StoredItem>> {
        let mut items: Vec<StoredItem> = self
            .load_documents()
            .await?
            .iter()
            .filter_map(|doc| match doc.to_record::<StoredItem>() {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping malformed clipboard document");
                    None
                }
            })
            .collect();
        ordering::sort_items(&mut items);
        Ok(items)
    }

    async fn find_document(&self, id: &str) -> ClipShelfResult<Option<Document>> {
        let docs = self
            .store
            .find(ITEMS_COLLECTION, &Query::ById(id.to_string()), &FindOptions::default())
            .await?;
        Ok(docs.into_iter().next())
    }

    async fn find_item(&self, id: &str) -> ClipShelfResult<Option<(Document, StoredItem)>> {
        match self.find_document(id).await? {
            Some(doc) => {
                let item = doc.to_record::<StoredItem>()?;
                Ok(Some((doc, item)))
            }
            None => Ok(None),
        }
    }

    /// Write `fields` over an existing document body, keeping everything else
    async fn patch(&self, base: &Document, fields: Vec<(&str, Value)>) -> ClipShelfResult<()> {
        let mut body = base.body.clone();
        if let Value::Object(map) = &mut body {
            for (key, value) in fields {
                map.insert(key.to_string(), value);
            }
        }
        let updated = Document::from_body(body)?;
        self.store.upsert(ITEMS_COLLECTION, updated, Some(base)).await?;
        Ok(())
    }

    async fn hydrate(item: StoredItem) -> ClipboardItem {
        let blob = match &item.content {
            StoredContent::Text { .. } => None,
            StoredContent::Image { image_data, mime_type } => match codec::hydrate(image_data, mime_type).await {
                Ok(blob) => Some(blob),
                Err(e) => {
                    warn!(id = %item.id, error = %e, "Image payload could not be restored, returning stored record");
                    None
                }
            },
        };
        ClipboardItem { stored: item, blob }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// All items in display order with image payloads hydrated
    pub async fn list_all(&self) -> ClipShelfResult<Vec<ClipboardItem>> {
        let items = self.load_sorted().await?;
        Ok(join_all(items.into_iter().map(Self::hydrate)).await)
    }

    /// Aggregate counts and sizes straight from the raw documents
    pub async fn metadata(&self) -> ClipShelfResult<ClipboardMetadata> {
        let docs = self
            .store
            .find(ITEMS_COLLECTION, &Query::All, &FindOptions::default())
            .await?;

        let kind_count = |kind: &str| {
            docs.iter()
                .filter(|doc| doc.field("type").and_then(Value::as_str) == Some(kind))
                .count() as u64
        };
        let latest = |field: &str| {
            docs.iter()
                .filter_map(|doc| doc.field(field).map(normalize_timestamp))
                .filter(|ts| *ts != 0)
                .max()
        };

        Ok(ClipboardMetadata {
            total: docs.len() as u64,
            text_count: kind_count("text"),
            image_count: kind_count("image"),
            latest_created_at: latest("createdAt"),
            latest_updated_at: latest("updatedAt"),
            estimated_bytes: docs.iter().map(|doc| doc.serialized_len() as u64).sum(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Add a text item at the top of the unpinned partition.
    /// Returns `None` without writing when the content is blank.
    pub async fn add_text(&self, content: &str) -> ClipShelfResult<Option<ClipboardItem>> {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let items = self.load_sorted().await?;
        let item = StoredItem::new_text(content.to_string(), ordering::insertion_order(&items), self.clock.now_ms());
        self.store
            .upsert(ITEMS_COLLECTION, Document::from_record(&item)?, None)
            .await?;

        debug!(id = %item.id, order = item.order, "Added text item");
        Ok(Some(item.into()))
    }

    /// Add an image item at the top of the unpinned partition.
    /// The payload is normalized to PNG first; nothing is written if that fails.
    pub async fn add_image(&self, payload: Vec<u8>, mime_type: &str) -> ClipShelfResult<ClipboardItem> {
        let (png, mime_type) = codec::normalize(payload, mime_type).await?;
        let image_data = codec::encode(&png, &mime_type);

        let items = self.load_sorted().await?;
        let item = StoredItem::new_image(
            image_data,
            mime_type.clone(),
            ordering::insertion_order(&items),
            self.clock.now_ms(),
        );
        self.store
            .upsert(ITEMS_COLLECTION, Document::from_record(&item)?, None)
            .await?;

        debug!(id = %item.id, order = item.order, bytes = png.len(), "Added image item");
        Ok(ClipboardItem {
            stored: item,
            blob: Some(ImageBlob { bytes: png, mime_type }),
        })
    }

    /// Replace the content of a text item. Order, pin state and creation time are kept.
    pub async fn update_text(&self, id: &str, content: &str) -> ClipShelfResult<()> {
        let (doc, item) = self
            .find_item(id)
            .await?
            .ok_or_else(|| ClipShelfError::NotFound(id.to_string()))?;

        if !matches!(item.content, StoredContent::Text { .. }) {
            return Err(ClipShelfError::InvalidInput(format!("item {} is not a text item", id)));
        }

        self.patch(&doc, vec![
            ("content", json!(content)),
            ("updatedAt", json!(self.clock.now_ms())),
        ])
        .await?;

        debug!(id, "Updated text item");
        Ok(())
    }

    /// Pin to the top of the pinned partition, or unpin to the bottom of the
    /// unpinned one. Unknown ids are ignored.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> ClipShelfResult<()> {
        let Some((doc, _)) = self.find_item(id).await? else {
            return Ok(());
        };

        let items = self.load_sorted().await?;
        let order = if pinned {
            ordering::pinned_order(&items)
        } else {
            ordering::unpinned_order(&items, id)
        };

        self.patch(&doc, vec![
            ("pinned", json!(pinned)),
            ("order", json!(order)),
            ("updatedAt", json!(self.clock.now_ms())),
        ])
        .await?;

        debug!(id, pinned, order, "Changed pin state");
        Ok(())
    }

    /// Remove one item. Unknown ids are ignored; malformed documents are removed too.
    pub async fn delete(&self, id: &str) -> ClipShelfResult<()> {
        if self.find_document(id).await?.is_none() {
            return Ok(());
        }
        self.store.remove(ITEMS_COLLECTION, &[id.to_string()]).await?;
        debug!(id, "Deleted item");
        Ok(())
    }

    /// Make `items` the canonical order: each item found in the store gets its
    /// position in the sequence as its order. Items missing from the store are
    /// skipped; a repeated id keeps its first position.
    pub async fn reorder(&self, items: &[ClipboardItem]) -> ClipShelfResult<()> {
        let docs: HashMap<String, Document> = self
            .load_documents()
            .await?
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();

        let now = self.clock.now_ms();
        let mut seen = HashSet::new();
        let mut written = 0usize;

        for (position, item) in items.iter().enumerate() {
            if !seen.insert(item.id()) {
                continue;
            }
            let Some(base) = docs.get(item.id()) else {
                continue;
            };
            self.patch(base, vec![
                ("order", json!(position as f64)),
                ("updatedAt", json!(now)),
            ])
            .await?;
            written += 1;
        }

        debug!(requested = items.len(), written, "Reordered items");
        Ok(())
    }

    /// Remove every item. Returns how many were removed.
    pub async fn clear_all(&self) -> ClipShelfResult<usize> {
        let ids: Vec<String> = self.load_documents().await?.into_iter().map(|doc| doc.id).collect();
        if !ids.is_empty() {
            self.store.remove(ITEMS_COLLECTION, &ids).await?;
        }
        info!(removed = ids.len(), "Cleared clipboard history");
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{StoreError, StoreResult};
    use crate::memory::MemoryDocumentStore;
    use crate::models::ItemKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Advances one millisecond per reading
    struct TickClock(AtomicI64);

    impl Clock for TickClock {
        fn now_ms(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn setup() -> (Arc<MemoryDocumentStore>, ItemRepository) {
        let store = Arc::new(MemoryDocumentStore::new());
        let repo = ItemRepository::with_clock(store.clone(), Arc::new(TickClock(AtomicI64::new(1_000))));
        (store, repo)
    }

    fn texts(items: &[ClipboardItem]) -> Vec<&str> {
        items.iter().map(|i| i.text().unwrap_or("<image>")).collect()
    }

    async fn add(repo: &ItemRepository, content: &str) -> ClipboardItem {
        repo.add_text(content).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_hello_world_pin_scenario() {
        let (_, repo) = setup();

        let hello = add(&repo, "hello").await;
        let items = repo.list_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text(), Some("hello"));
        assert!(!items[0].is_pinned());
        assert_eq!(items[0].stored.order, 0.0);

        add(&repo, "world").await;
        assert_eq!(texts(&repo.list_all().await.unwrap()), vec!["world", "hello"]);

        repo.set_pinned(hello.id(), true).await.unwrap();
        assert_eq!(texts(&repo.list_all().await.unwrap()), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_blank_text_is_not_stored() {
        let (store, repo) = setup();
        assert!(repo.add_text("").await.unwrap().is_none());
        assert!(repo.add_text(" \n\t ").await.unwrap().is_none());
        assert!(store.is_empty(ITEMS_COLLECTION));
    }

    #[tokio::test]
    async fn test_newest_unpinned_item_has_smallest_order() {
        let (_, repo) = setup();
        let first = add(&repo, "first").await;
        repo.set_pinned(first.id(), true).await.unwrap();

        for i in 0..6 {
            let added = add(&repo, &format!("item {}", i)).await;
            let items = repo.list_all().await.unwrap();
            let min_unpinned = items
                .iter()
                .filter(|i| !i.is_pinned())
                .map(|i| i.stored.order)
                .fold(f64::INFINITY, f64::min);
            assert_eq!(added.stored.order, min_unpinned);
            // First unpinned row is the one just added
            assert_eq!(items[1].id(), added.id());
        }
    }

    #[tokio::test]
    async fn test_pin_and_unpin_move_between_partitions() {
        let (_, repo) = setup();
        let a = add(&repo, "a").await;
        add(&repo, "b").await;
        let c = add(&repo, "c").await;
        // c, b, a
        repo.set_pinned(a.id(), true).await.unwrap();
        repo.set_pinned(c.id(), true).await.unwrap();
        assert_eq!(texts(&repo.list_all().await.unwrap()), vec!["c", "a", "b"]);

        add(&repo, "d").await;
        assert_eq!(texts(&repo.list_all().await.unwrap()), vec!["c", "a", "d", "b"]);

        // Unpinned item goes after remaining pinned ones and below every unpinned one
        repo.set_pinned(c.id(), false).await.unwrap();
        let items = repo.list_all().await.unwrap();
        assert_eq!(texts(&items), vec!["a", "d", "b", "c"]);
        let c_after = items.iter().find(|i| i.id() == c.id()).unwrap();
        assert!(!c_after.is_pinned());
        assert!(c_after.stored.updated_at > c.stored.updated_at);

        // Unknown id is a no-op
        repo.set_pinned("missing", true).await.unwrap();
        assert_eq!(repo.list_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_update_text() {
        let (_, repo) = setup();
        let item = add(&repo, "before").await;
        add(&repo, "other").await;
        repo.set_pinned(item.id(), true).await.unwrap();
        let pinned = repo.list_all().await.unwrap().remove(0);

        repo.update_text(item.id(), "after").await.unwrap();
        let updated = repo.list_all().await.unwrap().remove(0);

        assert_eq!(updated.text(), Some("after"));
        assert_eq!(updated.stored.order, pinned.stored.order);
        assert_eq!(updated.stored.created_at, pinned.stored.created_at);
        assert!(updated.is_pinned());
        assert!(updated.stored.updated_at > pinned.stored.updated_at);

        assert!(matches!(
            repo.update_text("missing", "x").await,
            Err(ClipShelfError::NotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_update_text_rejects_images() {
        let (_, repo) = setup();
        let image = repo.add_image(vec![1, 2, 3], "image/png").await.unwrap();
        assert!(matches!(
            repo.update_text(image.id(), "text").await,
            Err(ClipShelfError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, repo) = setup();
        let keep = add(&repo, "keep").await;
        let gone = add(&repo, "gone").await;

        repo.delete(gone.id()).await.unwrap();
        let after_once = repo.list_all().await.unwrap();
        repo.delete(gone.id()).await.unwrap();
        let after_twice = repo.list_all().await.unwrap();

        assert_eq!(after_once, after_twice);
        assert_eq!(store.len(ITEMS_COLLECTION), 1);
        assert_eq!(after_twice[0].id(), keep.id());
    }

    #[tokio::test]
    async fn test_reorder() {
        let (_, repo) = setup();
        let a = add(&repo, "a").await;
        let b = add(&repo, "b").await;
        let c = add(&repo, "c").await;
        let ghost: ClipboardItem = StoredItem::new_text("ghost".into(), 0.0, 0).into();

        let before = repo.list_all().await.unwrap();
        repo.reorder(&[a.clone(), ghost, c.clone(), b.clone()]).await.unwrap();
        let after = repo.list_all().await.unwrap();

        assert_eq!(texts(&after), vec!["a", "c", "b"]);
        let orders: Vec<f64> = after.iter().map(|i| i.stored.order).collect();
        assert_eq!(orders, vec![0.0, 2.0, 3.0]);
        for item in &after {
            let old = before.iter().find(|o| o.id() == item.id()).unwrap();
            assert!(item.stored.updated_at > old.stored.updated_at);
        }
    }

    #[tokio::test]
    async fn test_reorder_contiguous_when_all_found() {
        let (_, repo) = setup();
        for name in ["a", "b", "c", "d"] {
            add(&repo, name).await;
        }
        let mut items = repo.list_all().await.unwrap();
        items.reverse();
        repo.reorder(&items).await.unwrap();

        let after = repo.list_all().await.unwrap();
        assert_eq!(texts(&after), vec!["a", "b", "c", "d"]);
        let orders: Vec<f64> = after.iter().map(|i| i.stored.order).collect();
        assert_eq!(orders, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (store, repo) = setup();
        assert_eq!(repo.clear_all().await.unwrap(), 0);

        add(&repo, "a").await;
        add(&repo, "b").await;
        assert_eq!(repo.clear_all().await.unwrap(), 2);
        assert!(store.is_empty(ITEMS_COLLECTION));
        assert_eq!(repo.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_items_are_hydrated() {
        let (_, repo) = setup();
        let added = repo.add_image(vec![9, 8, 7], "image/png").await.unwrap();
        assert_eq!(added.kind(), ItemKind::Image);
        assert_eq!(added.blob.as_ref().unwrap().bytes, vec![9, 8, 7]);

        let listed = repo.list_all().await.unwrap();
        assert_eq!(listed[0].blob, added.blob);
        assert!(!listed[0].is_degraded());
    }

    #[tokio::test]
    async fn test_corrupt_image_is_returned_degraded() {
        let (store, repo) = setup();
        add(&repo, "text").await;
        let mut broken = StoredItem::new_image("data:image/png;base64,!!!".into(), "image/png".into(), -5.0, 1);
        broken.id = "broken".into();
        store
            .upsert(ITEMS_COLLECTION, Document::from_record(&broken).unwrap(), None)
            .await
            .unwrap();

        let items = repo.list_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id(), "broken");
        assert!(items[0].is_degraded());
    }

    #[tokio::test]
    async fn test_failed_transcode_persists_nothing() {
        let (store, repo) = setup();
        let result = repo.add_image(b"definitely not a jpeg".to_vec(), "image/jpeg").await;
        assert!(matches!(result, Err(ClipShelfError::Codec(_))));
        assert!(store.is_empty(ITEMS_COLLECTION));
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped_but_counted() {
        let (store, repo) = setup();
        add(&repo, "fine").await;
        store
            .upsert(ITEMS_COLLECTION, Document::from_body(json!({"id": "junk", "type": "video"})).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(texts(&repo.list_all().await.unwrap()), vec!["fine"]);
        let meta = repo.metadata().await.unwrap();
        assert_eq!(meta.total, 2);
        assert_eq!(meta.text_count, 1);
        assert_eq!(meta.image_count, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_malformed_document() {
        let (store, repo) = setup();
        let keep = add(&repo, "keep").await;
        store
            .upsert(ITEMS_COLLECTION, Document::from_body(json!({"id": "junk", "type": "video"})).unwrap(), None)
            .await
            .unwrap();

        repo.delete("junk").await.unwrap();

        assert_eq!(store.len(ITEMS_COLLECTION), 1);
        assert_eq!(repo.metadata().await.unwrap().total, 1);
        assert_eq!(repo.list_all().await.unwrap()[0].id(), keep.id());
    }

    #[tokio::test]
    async fn test_metadata() {
        let (_, repo) = setup();
        assert_eq!(repo.metadata().await.unwrap(), ClipboardMetadata::default());

        let text = add(&repo, "hello").await;
        let image = repo.add_image(vec![1; 32], "image/png").await.unwrap();
        repo.update_text(text.id(), "hello again").await.unwrap();

        let meta = repo.metadata().await.unwrap();
        assert_eq!(meta.total, 2);
        assert_eq!(meta.text_count, 1);
        assert_eq!(meta.image_count, 1);
        assert_eq!(meta.latest_created_at, Some(image.stored.created_at));
        assert!(meta.latest_updated_at.unwrap() > image.stored.updated_at);
        assert!(meta.estimated_bytes > 32);
    }

    #[tokio::test]
    async fn test_patch_keeps_unknown_fields() {
        let (store, repo) = setup();
        let item = add(&repo, "x").await;
        let mut body = serde_json::to_value(&item.stored).unwrap();
        body["_legacy"] = json!("kept");
        store
            .upsert(ITEMS_COLLECTION, Document::from_body(body).unwrap(), None)
            .await
            .unwrap();

        repo.set_pinned(item.id(), true).await.unwrap();
        let docs = store
            .find(ITEMS_COLLECTION, &Query::ById(item.id().to_string()), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(docs[0].body["_legacy"], "kept");
        assert_eq!(docs[0].body["pinned"], true);
    }

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn find(&self, _: &str, _: &Query, _: &FindOptions) -> StoreResult<Vec<Document>> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn upsert(&self, _: &str, _: Document, _: Option<&Document>) -> StoreResult<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        async fn remove(&self, _: &str, _: &[String]) -> StoreResult<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let repo = ItemRepository::new(Arc::new(FailingStore));
        assert!(matches!(repo.list_all().await, Err(ClipShelfError::Store(_))));
        assert!(matches!(repo.add_text("x").await, Err(ClipShelfError::Store(_))));
        assert!(matches!(repo.delete("x").await, Err(ClipShelfError::Store(_))));
    }
}
