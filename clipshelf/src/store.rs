//! ClipboardStore - the context object handed to every consumer
//!
//! Bundles the list (and through it the repository and sync coordinator), the
//! settings repository and the platform clipboard. Each instance is fully
//! independent, so tests can run several side by side.

use crate::codec;
use crate::database::SqliteDocumentStore;
use crate::interface::{
    ClipShelfError, ClipShelfResult, ClipboardPort, ClipboardRead, Clock, DocumentStore, StoreError, SystemClock,
};
use crate::list::{ClipboardList, LoadMode};
use crate::memory::MemoryDocumentStore;
use crate::models::{AppSettings, ClipboardItem, ClipboardMetadata, SettingsPatch, StoredContent};
use crate::repository::ItemRepository;
use crate::settings::SettingsRepository;
use crate::sync::{SyncConfig, SyncCoordinator};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the most recent copy attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFeedback {
    /// Increments on every attempt, successful or not
    pub event_id: u64,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default)]
struct FeedbackState {
    next_event_id: u64,
    last: Option<CopyFeedback>,
}

pub struct ClipboardStore {
    list: ClipboardList,
    settings: SettingsRepository,
    port: Arc<dyn ClipboardPort>,
    feedback: Mutex<FeedbackState>,
}

impl ClipboardStore {
    /// Open or create a SQLite-backed store at `path`
    pub fn open<P: AsRef<Path>>(path: P, port: Arc<dyn ClipboardPort>) -> ClipShelfResult<Self> {
        let db = SqliteDocumentStore::open(path).map_err(StoreError::from)?;
        Ok(Self::with_store(Arc::new(db), port, SyncConfig::default()))
    }

    /// Store backed by memory only
    pub fn in_memory(port: Arc<dyn ClipboardPort>) -> Self {
        Self::with_store(Arc::new(MemoryDocumentStore::new()), port, SyncConfig::default())
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, port: Arc<dyn ClipboardPort>, config: SyncConfig) -> Self {
        Self::with_clock(store, port, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        port: Arc<dyn ClipboardPort>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repo = ItemRepository::with_clock(Arc::clone(&store), clock);
        Self {
            list: ClipboardList::new(repo, SyncCoordinator::new(config)),
            settings: SettingsRepository::new(store),
            port,
            feedback: Mutex::new(FeedbackState::default()),
        }
    }

    pub fn list(&self) -> &ClipboardList {
        &self.list
    }

    /// Initial or manual load, with the sync indicator
    pub async fn load(&self) -> ClipShelfResult<bool> {
        self.list.load_items(LoadMode::Visible).await
    }

    pub async fn metadata(&self) -> ClipShelfResult<ClipboardMetadata> {
        self.list.repository().metadata().await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn settings(&self) -> AppSettings {
        self.settings.load().await
    }

    pub async fn save_settings(&self, patch: SettingsPatch) -> ClipShelfResult<AppSettings> {
        self.settings.save(patch).await
    }

    /// Pin or unpin through the list. Rejected while pinning is disabled.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> ClipShelfResult<bool> {
        if !self.settings().await.enable_pin {
            return Err(ClipShelfError::InvalidInput("pinning is disabled".into()));
        }
        self.list.set_pinned(id, pinned).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Platform Clipboard
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn last_copy_feedback(&self) -> Option<CopyFeedback> {
        self.feedback.lock().last.clone()
    }

    fn record_feedback(&self, success: bool, message: impl Into<String>) -> CopyFeedback {
        let mut state = self.feedback.lock();
        state.next_event_id += 1;
        let feedback = CopyFeedback {
            event_id: state.next_event_id,
            success,
            message: message.into(),
        };
        state.last = Some(feedback.clone());
        feedback
    }

    async fn write_to_port(&self, item: &ClipboardItem) -> Result<(), String> {
        match &item.stored.content {
            StoredContent::Text { content } => self.port.write_text(content).await.map_err(|e| e.to_string()),
            StoredContent::Image { .. } => {
                let blob = item.blob.as_ref().ok_or("image payload is unavailable")?;
                // Items stored before normalization may still hold another format
                let (png, _) = codec::normalize(blob.bytes.clone(), &blob.mime_type)
                    .await
                    .map_err(|e| e.to_string())?;
                self.port.write_image(&png).await.map_err(|e| e.to_string())
            }
        }
    }

    /// Copy a listed item to the platform clipboard.
    /// Port failures are reported in the feedback, not as `Err`.
    pub async fn copy_item(&self, id: &str) -> ClipShelfResult<CopyFeedback> {
        let item = self
            .list
            .items()
            .iter()
            .find(|item| item.id() == id)
            .cloned()
            .ok_or_else(|| ClipShelfError::NotFound(id.to_string()))?;

        let is_image = matches!(item.stored.content, StoredContent::Image { .. });
        let feedback = match self.write_to_port(&item).await {
            Ok(()) if is_image => self.record_feedback(true, "Image copied to clipboard"),
            Ok(()) => self.record_feedback(true, "Copied to clipboard"),
            Err(reason) => {
                warn!(id, %reason, "Copy to clipboard failed");
                let message = if is_image { "Failed to copy image" } else { "Copy failed" };
                self.record_feedback(false, message)
            }
        };
        Ok(feedback)
    }

    /// Add whatever the platform clipboard holds; images win over text.
    /// `None` when the clipboard is empty or the add was dropped.
    pub async fn capture_from_clipboard(&self, auto_select: bool) -> ClipShelfResult<Option<ClipboardItem>> {
        match self.port.read_clipboard().await {
            ClipboardRead::Image { payload, mime_type } => {
                debug!(%mime_type, bytes = payload.len(), "Capturing image from clipboard");
                self.list.add_image(payload, &mime_type, auto_select).await
            }
            ClipboardRead::Text { value } => self.list.add_text(&value, auto_select).await,
            ClipboardRead::Empty => Ok(None),
        }
    }
}
