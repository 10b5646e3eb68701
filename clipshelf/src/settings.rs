//! Settings repository: a single settings document, never deleted

use crate::interface::{ClipShelfResult, Document, DocumentStore, FindOptions, Query, StoreError};
use crate::models::{AppSettings, CopyMode, SettingsPatch};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub const SETTINGS_COLLECTION: &str = "app-settings";
pub const SETTINGS_ID: &str = "app-settings";

/// Read settings field by field so one bad value doesn't reset the others
fn normalize_settings(body: &Value) -> AppSettings {
    let defaults = AppSettings::default();
    AppSettings {
        enable_pin: body
            .get("enablePin")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.enable_pin),
        copy_mode: match body.get("copyMode").and_then(Value::as_str) {
            Some("double-tap") => CopyMode::DoubleTap,
            _ => defaults.copy_mode,
        },
    }
}

#[derive(Clone)]
pub struct SettingsRepository {
    store: Arc<dyn DocumentStore>,
}

impl SettingsRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn find_document(&self) -> ClipShelfResult<Option<Document>> {
        let docs = self
            .store
            .find(SETTINGS_COLLECTION, &Query::ById(SETTINGS_ID.to_string()), &FindOptions::default())
            .await?;
        Ok(docs.into_iter().next())
    }

    /// Current settings; defaults when the record is missing or unreadable
    pub async fn load(&self) -> AppSettings {
        match self.find_document().await {
            Ok(Some(doc)) => normalize_settings(&doc.body),
            Ok(None) => AppSettings::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                AppSettings::default()
            }
        }
    }

    /// Merge `patch` over the stored settings and persist the full record
    pub async fn save(&self, patch: SettingsPatch) -> ClipShelfResult<AppSettings> {
        let existing = self.find_document().await?;
        let current = existing
            .as_ref()
            .map(|doc| normalize_settings(&doc.body))
            .unwrap_or_default();
        let merged = current.merged(patch);

        let mut body = existing
            .as_ref()
            .map(|doc| doc.body.clone())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        if let Value::Object(map) = &mut body {
            map.insert("id".into(), json!(SETTINGS_ID));
            map.insert("enablePin".into(), json!(merged.enable_pin));
            map.insert("copyMode".into(), serde_json::to_value(merged.copy_mode).map_err(StoreError::from)?);
        }

        self.store
            .upsert(SETTINGS_COLLECTION, Document::from_body(body)?, existing.as_ref())
            .await?;
        Ok(merged)
    }
}
