//! Core data models for ClipShelf
//!
//! `StoredItem` is exactly what goes into the document store. The decoded image
//! bytes only ever live on `ClipboardItem`, which is not serializable, so
//! runtime-only data cannot be written back by accident.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// PERSISTED ITEM
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Image,
}

/// Type-specific payload, flattened into the document next to a `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredContent {
    Text {
        content: String,
    },
    Image {
        /// Data URL produced by the codec
        #[serde(rename = "imageData")]
        image_data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl StoredContent {
    pub fn kind(&self) -> ItemKind {
        match self {
            StoredContent::Text { .. } => ItemKind::Text,
            StoredContent::Image { .. } => ItemKind::Image,
        }
    }
}

/// Clipboard item as persisted: one document per id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub id: String,
    #[serde(flatten)]
    pub content: StoredContent,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: i64,
    /// Non-finite values serialize as `null` and read back as +inf (sorts last)
    #[serde(default = "missing_order", deserialize_with = "lenient_order")]
    pub order: f64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub pinned: bool,
}

impl StoredItem {
    /// Create a new unpinned text item with a fresh id
    pub fn new_text(content: String, order: f64, now_ms: i64) -> Self {
        Self::new(StoredContent::Text { content }, order, now_ms)
    }

    /// Create a new unpinned image item from an already-encoded payload
    pub fn new_image(image_data: String, mime_type: String, order: f64, now_ms: i64) -> Self {
        Self::new(StoredContent::Image { image_data, mime_type }, order, now_ms)
    }

    fn new(content: StoredContent, order: f64, now_ms: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            created_at: now_ms,
            updated_at: now_ms,
            order,
            pinned: false,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    /// Text payload, or `None` for images
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            StoredContent::Text { content } => Some(content),
            StoredContent::Image { .. } => None,
        }
    }
}

fn missing_order() -> f64 {
    f64::INFINITY
}

fn lenient_order<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(crate::ordering::normalize_order(&value))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(normalize_timestamp(&value))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => false,
    })
}

/// Epoch milliseconds from a loosely-typed field; anything unusable is 0
pub fn normalize_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map_or(0, |f| f as i64),
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RUNTIME ITEM (never persisted)
// ─────────────────────────────────────────────────────────────────────────────

/// Decoded image bytes reconstructed on every read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A stored item plus its hydrated image, if any
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardItem {
    pub stored: StoredItem,
    /// `None` for text, and for images whose payload failed to decode
    pub blob: Option<ImageBlob>,
}

impl ClipboardItem {
    pub fn id(&self) -> &str {
        &self.stored.id
    }

    pub fn kind(&self) -> ItemKind {
        self.stored.kind()
    }

    pub fn text(&self) -> Option<&str> {
        self.stored.text()
    }

    pub fn is_pinned(&self) -> bool {
        self.stored.pinned
    }

    /// True for images that could not be hydrated
    pub fn is_degraded(&self) -> bool {
        self.kind() == ItemKind::Image && self.blob.is_none()
    }
}

impl From<StoredItem> for ClipboardItem {
    fn from(stored: StoredItem) -> Self {
        Self { stored, blob: None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SETTINGS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyMode {
    #[default]
    SingleTap,
    DoubleTap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub enable_pin: bool,
    pub copy_mode: CopyMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            enable_pin: true,
            copy_mode: CopyMode::SingleTap,
        }
    }
}

/// Partial settings update; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub enable_pin: Option<bool>,
    pub copy_mode: Option<CopyMode>,
}

impl AppSettings {
    pub fn merged(self, patch: SettingsPatch) -> Self {
        Self {
            enable_pin: patch.enable_pin.unwrap_or(self.enable_pin),
            copy_mode: patch.copy_mode.unwrap_or(self.copy_mode),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// METADATA
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate view over every stored item, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardMetadata {
    pub total: u64,
    pub text_count: u64,
    pub image_count: u64,
    pub latest_created_at: Option<i64>,
    pub latest_updated_at: Option<i64>,
    /// Sum of serialized document sizes in bytes
    pub estimated_bytes: u64,
}
