//! ClipShelf Core - clipboard history ordering and synchronization
//!
//! Items live in a document store as JSON documents; images are kept as PNG
//! data URLs. `ClipboardStore` is the entry point: it owns the in-memory list,
//! the sync coordinator that serializes mutations, and the settings record.

pub mod codec;
pub mod database;
pub mod interface;
pub mod list;
pub mod memory;
pub mod models;
pub mod ordering;
pub mod repository;
pub mod settings;
mod store;
pub mod sync;

pub use interface::*;
pub use list::{ClipboardList, LoadMode};
pub use memory::{MemoryClipboard, MemoryDocumentStore};
pub use models::{AppSettings, ClipboardItem, ClipboardMetadata, CopyMode, ItemKind, SettingsPatch};
pub use store::{ClipboardStore, CopyFeedback};
pub use sync::{SyncConfig, SyncCoordinator, SyncPhase};
