//! In-memory adapters
//!
//! `MemoryDocumentStore` is backed by hash maps, so `find` without a sort
//! option returns documents in arbitrary order. Every call yields to the
//! scheduler once to behave like a store that suspends on I/O.
//!
//! `MemoryClipboard` stands in for the platform clipboard.

use crate::interface::{
    sort_by_field, ClipboardPort, ClipboardPortError, ClipboardRead, Document, DocumentStore, FindOptions, Query,
    StoreError, StoreResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>> {
        tokio::task::yield_now().await;

        let mut documents: Vec<Document> = {
            let collections = self.collections.lock();
            match collections.get(collection) {
                Some(docs) => docs.values().filter(|doc| query.matches(doc)).cloned().collect(),
                None => Vec::new(),
            }
        };

        if let Some(field) = &options.sort {
            sort_by_field(&mut documents, field);
        }
        Ok(documents)
    }

    async fn upsert(&self, collection: &str, document: Document, previous: Option<&Document>) -> StoreResult<()> {
        tokio::task::yield_now().await;

        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(previous) = previous {
            if docs.get(&document.id).map(|current| &current.body) != Some(&previous.body) {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    id: document.id,
                });
            }
        }

        docs.insert(document.id.clone(), document);
        Ok(())
    }

    async fn remove(&self, collection: &str, ids: &[String]) -> StoreResult<()> {
        tokio::task::yield_now().await;

        if let Some(docs) = self.collections.lock().get_mut(collection) {
            for id in ids {
                docs.remove(id);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clipboard
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryClipboard {
    contents: Mutex<ClipboardRead>,
    reject_writes: AtomicBool,
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self {
            contents: Mutex::new(ClipboardRead::Empty),
            reject_writes: AtomicBool::new(false),
        }
    }
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_contents(&self, contents: ClipboardRead) {
        *self.contents.lock() = contents;
    }

    pub fn contents(&self) -> ClipboardRead {
        self.contents.lock().clone()
    }

    /// Make every following write fail with `Rejected`
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), ClipboardPortError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(ClipboardPortError::Rejected("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClipboardPort for MemoryClipboard {
    async fn read_clipboard(&self) -> ClipboardRead {
        self.contents()
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardPortError> {
        self.check_writable()?;
        self.set_contents(ClipboardRead::Text { value: text.to_string() });
        Ok(())
    }

    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardPortError> {
        self.check_writable()?;
        self.set_contents(ClipboardRead::Image {
            payload: png.to_vec(),
            mime_type: crate::codec::CANONICAL_MIME.to_string(),
        });
        Ok(())
    }
}
