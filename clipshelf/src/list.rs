//! In-memory clipboard list and selection cursor
//!
//! Every mutation runs inside the sync coordinator's exclusive section and ends
//! by re-reading the repository. The held snapshot is only swapped when the
//! fresh read differs by fingerprint, so consumers holding the previous `Arc`
//! can tell nothing changed with a pointer comparison.
//!
//! Nothing is applied optimistically: a failed repository call leaves the list
//! exactly as it was.

use crate::interface::{ClipShelfError, ClipShelfResult};
use crate::models::{ClipboardItem, ItemKind};
use crate::repository::ItemRepository;
use crate::sync::SyncCoordinator;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Shows the sync indicator
    Visible,
    /// Background refresh; no indicator
    Silent,
}

/// The fields that decide whether a re-read changed anything visible
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFingerprint {
    pub id: String,
    pub kind: ItemKind,
    pub updated_at: i64,
    pub order: f64,
    pub pinned: bool,
}

impl From<&ClipboardItem> for ItemFingerprint {
    fn from(item: &ClipboardItem) -> Self {
        Self {
            id: item.stored.id.clone(),
            kind: item.kind(),
            updated_at: item.stored.updated_at,
            order: item.stored.order,
            pinned: item.stored.pinned,
        }
    }
}

/// Sequence equality over fingerprints, in order
pub fn same_fingerprints(current: &[ClipboardItem], fresh: &[ClipboardItem]) -> bool {
    current.len() == fresh.len()
        && current
            .iter()
            .zip(fresh)
            .all(|(a, b)| ItemFingerprint::from(a) == ItemFingerprint::from(b))
}

#[derive(Debug, Default)]
struct ListState {
    items: Arc<Vec<ClipboardItem>>,
    selected: Option<usize>,
}

impl ListState {
    fn clamp_selection(&mut self) {
        if let Some(index) = self.selected {
            if index >= self.items.len() {
                self.selected = self.items.len().checked_sub(1);
            }
        }
    }
}

/// Cheap to clone; clones share items, cursor and coordinator
#[derive(Clone)]
pub struct ClipboardList {
    repo: ItemRepository,
    sync: SyncCoordinator,
    state: Arc<Mutex<ListState>>,
}

impl ClipboardList {
    pub fn new(repo: ItemRepository, sync: SyncCoordinator) -> Self {
        Self {
            repo,
            sync,
            state: Arc::new(Mutex::new(ListState::default())),
        }
    }

    pub fn repository(&self) -> &ItemRepository {
        &self.repo
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Snapshot & Selection
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current snapshot. Unchanged reloads return the same `Arc`.
    pub fn items(&self) -> Arc<Vec<ClipboardItem>> {
        Arc::clone(&self.state.lock().items)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.lock().selected
    }

    pub fn selected_item(&self) -> Option<ClipboardItem> {
        let state = self.state.lock();
        state.selected.and_then(|i| state.items.get(i).cloned())
    }

    pub fn select_next(&self) {
        let mut state = self.state.lock();
        let len = state.items.len();
        if len == 0 {
            return;
        }
        state.selected = match state.selected {
            None => Some(0),
            Some(i) => Some((i + 1).min(len - 1)),
        };
    }

    pub fn select_previous(&self) {
        let mut state = self.state.lock();
        if state.items.is_empty() {
            return;
        }
        state.selected = match state.selected {
            None => Some(0),
            Some(i) => Some(i.saturating_sub(1)),
        };
    }

    /// Out-of-range indices are ignored
    pub fn select_index(&self, index: usize) {
        let mut state = self.state.lock();
        if index < state.items.len() {
            state.selected = Some(index);
        }
    }

    pub fn clear_selection(&self) {
        self.state.lock().selected = None;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Swap in `fresh` if it differs from the held snapshot, or always when
    /// `force` is set. Returns whether it did.
    fn reconcile(&self, fresh: Vec<ClipboardItem>, force: bool) -> bool {
        let mut state = self.state.lock();
        let changed = force || !same_fingerprints(&state.items, &fresh);
        if changed {
            state.items = Arc::new(fresh);
        }
        state.clamp_selection();
        changed
    }

    async fn refresh(&self, force: bool) -> ClipShelfResult<bool> {
        let fresh = self.repo.list_all().await?;
        Ok(self.reconcile(fresh, force))
    }

    fn select_id(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(index) = state.items.iter().position(|item| item.id() == id) {
            state.selected = Some(index);
        }
    }

    /// Run `operation` then re-read, all inside one exclusive section.
    /// The re-read always replaces the snapshot: an edit within the same
    /// millisecond changes content but not the fingerprint.
    /// `Ok(None)` means the call was dropped because another one was running.
    async fn mutate<T, Fut>(&self, operation: Fut) -> ClipShelfResult<Option<T>>
    where
        Fut: Future<Output = ClipShelfResult<T>>,
    {
        self.sync
            .with_exclusive_access(async {
                let value = operation.await?;
                self.refresh(true).await?;
                Ok(value)
            })
            .await
            .transpose()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Re-read the repository. Returns `false` if the load was dropped.
    pub async fn load_items(&self, mode: LoadMode) -> ClipShelfResult<bool> {
        let outcome = match mode {
            LoadMode::Visible => self.sync.with_exclusive_access(self.refresh(false)).await,
            LoadMode::Silent => self.sync.with_silent_access(self.refresh(false)).await,
        };
        match outcome.transpose()? {
            Some(changed) => {
                debug!(?mode, changed, "Loaded items");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Add trimmed text. `None` for blank input or a dropped call.
    pub async fn add_text(&self, content: &str, auto_select: bool) -> ClipShelfResult<Option<ClipboardItem>> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let added = self.mutate(self.repo.add_text(content)).await?.flatten();
        if let (Some(item), true) = (&added, auto_select) {
            self.select_id(item.id());
        }
        Ok(added)
    }

    pub async fn add_image(
        &self,
        payload: Vec<u8>,
        mime_type: &str,
        auto_select: bool,
    ) -> ClipShelfResult<Option<ClipboardItem>> {
        let added = self.mutate(self.repo.add_image(payload, mime_type)).await?;
        if let (Some(item), true) = (&added, auto_select) {
            self.select_id(item.id());
        }
        Ok(added)
    }

    pub async fn update_text(&self, id: &str, content: &str) -> ClipShelfResult<bool> {
        Ok(self.mutate(self.repo.update_text(id, content)).await?.is_some())
    }

    /// Delete one item; the cursor is clamped to the new last index
    pub async fn delete_item(&self, id: &str) -> ClipShelfResult<bool> {
        Ok(self.mutate(self.repo.delete(id)).await?.is_some())
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool) -> ClipShelfResult<bool> {
        Ok(self.mutate(self.repo.set_pinned(id, pinned)).await?.is_some())
    }

    /// Persist `items` as the new order
    pub async fn reorder_items(&self, items: &[ClipboardItem]) -> ClipShelfResult<bool> {
        Ok(self.mutate(self.repo.reorder(items)).await?.is_some())
    }

    /// Move one item of the current snapshot to `to_index` (clamped) and persist
    /// the resulting sequence.
    pub async fn move_item(&self, id: &str, to_index: usize) -> ClipShelfResult<bool> {
        let mut sequence = self.items().to_vec();
        let from = sequence
            .iter()
            .position(|item| item.id() == id)
            .ok_or_else(|| ClipShelfError::NotFound(id.to_string()))?;
        let item = sequence.remove(from);
        sequence.insert(to_index.min(sequence.len()), item);
        self.reorder_items(&sequence).await
    }

    /// Remove everything and reset the cursor. `None` if dropped.
    pub async fn clear_all(&self) -> ClipShelfResult<Option<usize>> {
        let removed = self.mutate(self.repo.clear_all()).await?;
        if removed.is_some() {
            self.clear_selection();
        }
        Ok(removed)
    }

    /// Silently reload every `period` until `shutdown` is cancelled.
    ///
    /// Each tick claims the busy flag for the length of its reload, so a
    /// mutation issued during that window is dropped (`Ok(None)` or `Ok(false)`)
    /// and has to be re-issued by the caller.
    pub fn spawn_background_refresh(&self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let list = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = list.load_items(LoadMode::Silent).await {
                            warn!(error = %e, "Background refresh failed");
                        }
                    }
                }
            }
            debug!("Background refresh stopped");
        })
    }
}
